use crate::{
    AppState,
    auth::{self, AuthUser},
    directory::{group_listing, matches_search},
    error::{AppError, AppResult, JsonBody},
    models::{
        Account, AccountCreatedResponse, AccountsResponse, ChangeOwnPasswordRequest,
        ContactDetailResponse, ContactListing, ContactMutationResponse, ContactRequest,
        CreateAccountRequest, IdParam, LoginRequest, LoginResponse, LookupEntry, LookupKind,
        LookupRequest, MessageResponse, NewAccount, SessionUser, UpdateAccountRequest,
    },
    validation::{
        AccountStatus, parse_id, validate_account_update, validate_contact, validate_lookup,
        validate_new_account, validate_new_password,
    },
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use rand::{Rng, distributions::Alphanumeric};
use serde::Deserialize;
use serde_json::{Value, json};

/// Length of the generated first password of a new account.
const TEMPORARY_PASSWORD_LEN: usize = 10;

// --- Filter Structs ---

/// DirectoryFilter
///
/// Query parameters of the public directory listing (GET /api/contactos).
#[derive(Debug, Deserialize, Default, utoipa::IntoParams)]
pub struct DirectoryFilter {
    /// Case- and accent-insensitive text matched against every field of an entry.
    pub search: Option<String>,
}

// --- Health ---

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = String))
)]
pub async fn health() -> &'static str {
    "ok"
}

// --- Session ---

/// login
///
/// [Public Route] Exchanges a login name and password for a signed session token.
/// Unknown logins and wrong passwords share the same answer.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session opened", body = LoginResponse),
        (status = 400, description = "Missing fields"),
        (status = 401, description = "Invalid credentials or inactive account")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let usuario = payload.usuario.trim();
    if usuario.is_empty() || payload.password.is_empty() {
        return Err(AppError::BadRequest(
            "Usuario y contraseña son requeridos".to_string(),
        ));
    }

    let invalid = || AppError::Unauthorized("Credenciales inválidas".to_string());

    let credentials = state
        .repo
        .find_credentials(usuario)
        .await?
        .ok_or_else(invalid)?;

    if AccountStatus::parse(&credentials.estado) != Some(AccountStatus::Activa) {
        return Err(AppError::Unauthorized("Usuario inactivo".to_string()));
    }

    if !auth::verify_password(&payload.password, &credentials.password_hash) {
        tracing::info!(usuario, "login rejected: wrong password");
        return Err(invalid());
    }

    let user = credentials.session_user();
    let token = auth::issue_token(&user, &state.config)?;

    tracing::info!(user_id = %user.id, "login succeeded");
    Ok(Json(LoginResponse {
        success: true,
        token,
        user,
    }))
}

/// get_me
///
/// [Authenticated Route] Returns the identity behind the presented token, as currently stored.
#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses((status = 200, description = "Current identity", body = SessionUser))
)]
pub async fn get_me(user: AuthUser) -> Json<Value> {
    Json(json!({ "success": true, "user": user.session_user() }))
}

/// change_own_password
///
/// [Authenticated Route] Changes the password of the token's own account after checking
/// the current one.
#[utoipa::path(
    post,
    path = "/api/usuarios/change-own-password",
    request_body = ChangeOwnPasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Missing fields, short or wrong password"),
        (status = 404, description = "Account missing or inactive")
    )
)]
pub async fn change_own_password(
    user: AuthUser,
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<ChangeOwnPasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    if payload.current_password.is_empty() || payload.new_password.is_empty() {
        return Err(AppError::BadRequest(
            "Todos los campos son requeridos".to_string(),
        ));
    }
    validate_new_password(&payload.new_password)?;

    let credentials = state
        .repo
        .get_credentials(user.id)
        .await?
        .filter(|c| AccountStatus::parse(&c.estado) == Some(AccountStatus::Activa))
        .ok_or_else(|| AppError::NotFound("Usuario no encontrado o inactivo".to_string()))?;

    if !auth::verify_password(&payload.current_password, &credentials.password_hash) {
        return Err(AppError::BadRequest(
            "La contraseña actual es incorrecta".to_string(),
        ));
    }

    let hash = auth::hash_password(&payload.new_password)?;
    if !state.repo.set_password(user.id, &hash).await? {
        return Err(AppError::NotFound("Usuario no encontrado o inactivo".to_string()));
    }

    tracing::info!(user_id = %user.id, "password changed");
    Ok(Json(MessageResponse::ok("Contraseña actualizada exitosamente")))
}

// --- Directory ---

/// list_contacts
///
/// [Public Route] The public directory: one entry per number, grouped with all its users,
/// optionally narrowed by `?search=`. Answers with a bare array.
#[utoipa::path(
    get,
    path = "/api/contactos",
    params(DirectoryFilter),
    responses((status = 200, description = "Directory entries", body = [ContactListing]))
)]
pub async fn list_contacts(
    State(state): State<AppState>,
    Query(filter): Query<DirectoryFilter>,
) -> AppResult<Json<Vec<ContactListing>>> {
    let rows = state.repo.directory_rows().await?;
    let mut listing = group_listing(rows);

    if let Some(term) = filter.search.as_deref() {
        listing.retain(|entry| matches_search(entry, term));
    }

    Ok(Json(listing))
}

/// get_contact
///
/// [Public Route] One number with every directory user linked to it.
#[utoipa::path(
    get,
    path = "/api/contactos/{id}",
    params(("id" = String, Path, description = "Contact ID")),
    responses(
        (status = 200, description = "Found", body = ContactDetailResponse),
        (status = 400, description = "Malformed id"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_contact(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> AppResult<Json<ContactDetailResponse>> {
    let id = parse_id(Some(&raw_id), "ID de contacto requerido")?;

    let contacto = state
        .repo
        .get_contact(id)
        .await?
        .ok_or_else(contact_not_found)?;

    Ok(Json(ContactDetailResponse {
        success: true,
        contacto,
    }))
}

fn contact_not_found() -> AppError {
    AppError::NotFound("Contacto no encontrado".to_string())
}

fn numero_conflict() -> AppError {
    AppError::Conflict("Ya existe un contacto con este número".to_string())
}

/// create_contact
///
/// [Admin Route] Creates a number and one directory user per non-blank entry.
/// The number must not be in use by any contact, whatever its type.
#[utoipa::path(
    post,
    path = "/api/contactos",
    request_body = ContactRequest,
    responses(
        (status = 201, description = "Created", body = ContactMutationResponse),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Not an administrator"),
        (status = 409, description = "Number already registered")
    )
)]
pub async fn create_contact(
    user: AuthUser,
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<ContactRequest>,
) -> AppResult<(StatusCode, Json<ContactMutationResponse>)> {
    user.require_admin()?;
    let draft = validate_contact(&payload)?;

    if state.repo.numero_taken(&draft.numero, None).await? {
        return Err(numero_conflict());
    }

    let outcome = state.repo.create_contact(draft).await?;

    Ok((
        StatusCode::CREATED,
        Json(ContactMutationResponse {
            success: true,
            message: "Contacto creado exitosamente".to_string(),
            id: outcome.id,
            usuarios_creados: outcome.usuarios_creados,
        }),
    ))
}

/// update_contact
///
/// [Admin Route] Replaces the fields and the user list of a number. Keeping its own number
/// is allowed; taking another contact's number is a conflict.
#[utoipa::path(
    put,
    path = "/api/contactos/{id}",
    params(("id" = String, Path, description = "Contact ID")),
    request_body = ContactRequest,
    responses(
        (status = 200, description = "Updated", body = ContactMutationResponse),
        (status = 404, description = "Not Found"),
        (status = 409, description = "Number used by another contact")
    )
)]
pub async fn update_contact(
    user: AuthUser,
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    JsonBody(payload): JsonBody<ContactRequest>,
) -> AppResult<Json<ContactMutationResponse>> {
    user.require_admin()?;
    let id = parse_id(Some(&raw_id), "ID de contacto requerido")?;
    let draft = validate_contact(&payload)?;

    if !state.repo.contact_exists(id).await? {
        return Err(contact_not_found());
    }
    if state.repo.numero_taken(&draft.numero, Some(id)).await? {
        return Err(numero_conflict());
    }

    let outcome = state
        .repo
        .update_contact(id, draft)
        .await?
        .ok_or_else(contact_not_found)?;

    Ok(Json(ContactMutationResponse {
        success: true,
        message: "Contacto actualizado exitosamente".to_string(),
        id: outcome.id,
        usuarios_creados: outcome.usuarios_creados,
    }))
}

/// delete_contact
///
/// [Admin Route] Removes a number, its relations and the directory users left without any.
#[utoipa::path(
    delete,
    path = "/api/contactos/{id}",
    params(("id" = String, Path, description = "Contact ID")),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_contact(
    user: AuthUser,
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    user.require_admin()?;
    let id = parse_id(Some(&raw_id), "ID de contacto requerido")?;

    if !state.repo.delete_contact(id).await? {
        return Err(contact_not_found());
    }

    Ok(Json(MessageResponse::ok("Contacto eliminado exitosamente")))
}

// --- Lookup tables ---

fn lookup_kind(segment: &str) -> AppResult<LookupKind> {
    LookupKind::from_collection(segment)
        .ok_or_else(|| AppError::NotFound("Recurso no encontrado".to_string()))
}

/// "Cargo creado exitosamente", "Unidad eliminada exitosamente", ...
fn lookup_message(kind: LookupKind, stem: &str) -> String {
    let ending = if kind.is_feminine() { "a" } else { "o" };
    format!("{} {}{} exitosamente", kind.label(), stem, ending)
}

fn lookup_not_found(kind: LookupKind) -> AppError {
    let ending = if kind.is_feminine() { "a" } else { "o" };
    AppError::NotFound(format!("{} no encontrad{}", kind.label(), ending))
}

fn lookup_conflict(kind: LookupKind) -> AppError {
    let article = if kind.is_feminine() { "una" } else { "un" };
    AppError::Conflict(format!(
        "Ya existe {} {} con este nombre",
        article,
        kind.label().to_lowercase()
    ))
}

/// list_lookup
///
/// [Authenticated Route] Lists one suggestion table, e.g. `{"success": true, "cargos": [...]}`.
#[utoipa::path(
    get,
    path = "/api/{lookup}",
    params(("lookup" = String, Path, description = "cargos | direcciones | unidades | ubicaciones")),
    responses(
        (status = 200, description = "Entries ordered by name", body = [LookupEntry]),
        (status = 404, description = "Unknown lookup table")
    )
)]
pub async fn list_lookup(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(segment): Path<String>,
) -> AppResult<Json<Value>> {
    let kind = lookup_kind(&segment)?;
    let entries = state.repo.list_lookup(kind).await?;
    Ok(Json(json!({ "success": true, kind.collection_key(): entries })))
}

/// create_lookup
///
/// [Admin Route] Adds an entry. Names are unique per table, ignoring case.
#[utoipa::path(
    post,
    path = "/api/{lookup}",
    params(("lookup" = String, Path, description = "cargos | direcciones | unidades | ubicaciones")),
    request_body = LookupRequest,
    responses(
        (status = 201, description = "Created", body = LookupEntry),
        (status = 400, description = "Missing name"),
        (status = 409, description = "Duplicate name")
    )
)]
pub async fn create_lookup(
    user: AuthUser,
    State(state): State<AppState>,
    Path(segment): Path<String>,
    JsonBody(payload): JsonBody<LookupRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    user.require_admin()?;
    let kind = lookup_kind(&segment)?;
    let input = validate_lookup(kind, &payload)?;

    if state.repo.lookup_name_taken(kind, &input.nombre, None).await? {
        return Err(lookup_conflict(kind));
    }

    let entry = state.repo.create_lookup(kind, input).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            kind.table(): entry,
            "message": lookup_message(kind, "cread"),
        })),
    ))
}

/// update_lookup
///
/// [Admin Route] Renames an entry identified by the `id` in the body.
#[utoipa::path(
    put,
    path = "/api/{lookup}",
    params(("lookup" = String, Path, description = "cargos | direcciones | unidades | ubicaciones")),
    request_body = LookupRequest,
    responses(
        (status = 200, description = "Updated", body = LookupEntry),
        (status = 404, description = "Not Found"),
        (status = 409, description = "Duplicate name")
    )
)]
pub async fn update_lookup(
    user: AuthUser,
    State(state): State<AppState>,
    Path(segment): Path<String>,
    JsonBody(payload): JsonBody<LookupRequest>,
) -> AppResult<Json<Value>> {
    user.require_admin()?;
    let kind = lookup_kind(&segment)?;
    let id = payload
        .id
        .ok_or_else(|| AppError::BadRequest("ID y nombre son requeridos".to_string()))?;
    let input = validate_lookup(kind, &payload)?;

    if state.repo.lookup_name_taken(kind, &input.nombre, Some(id)).await? {
        return Err(lookup_conflict(kind));
    }

    let entry = state
        .repo
        .update_lookup(kind, id, input)
        .await?
        .ok_or_else(|| lookup_not_found(kind))?;

    Ok(Json(json!({
        "success": true,
        kind.table(): entry,
        "message": lookup_message(kind, "actualizad"),
    })))
}

/// delete_lookup
///
/// [Admin Route] Removes the entry named by `?id=`. Values already copied onto contacts are
/// left untouched.
#[utoipa::path(
    delete,
    path = "/api/{lookup}",
    params(
        ("lookup" = String, Path, description = "cargos | direcciones | unidades | ubicaciones"),
        IdParam
    ),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_lookup(
    user: AuthUser,
    State(state): State<AppState>,
    Path(segment): Path<String>,
    Query(params): Query<IdParam>,
) -> AppResult<Json<MessageResponse>> {
    user.require_admin()?;
    let kind = lookup_kind(&segment)?;
    let id = parse_id(
        params.id.as_deref(),
        &format!("ID de {} es requerido", kind.label().to_lowercase()),
    )?;

    if !state.repo.delete_lookup(kind, id).await? {
        return Err(lookup_not_found(kind));
    }

    Ok(Json(MessageResponse::ok(&lookup_message(kind, "eliminad"))))
}

// --- Accounts ---

fn temporary_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TEMPORARY_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

fn account_not_found() -> AppError {
    AppError::NotFound("Usuario no encontrado".to_string())
}

/// list_accounts
///
/// [Admin Route] Every login account with the names of its direction and unit.
#[utoipa::path(
    get,
    path = "/api/usuarios",
    responses(
        (status = 200, description = "Accounts", body = AccountsResponse),
        (status = 403, description = "Not an administrator")
    )
)]
pub async fn list_accounts(
    user: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<AccountsResponse>> {
    user.require_admin()?;
    let users = state.repo.list_accounts().await?;
    Ok(Json(AccountsResponse {
        success: true,
        users,
    }))
}

/// create_account
///
/// [Admin Route] Registers a new `Activa` account with a generated temporary password,
/// returned once in the response.
#[utoipa::path(
    post,
    path = "/api/usuarios",
    request_body = CreateAccountRequest,
    responses(
        (status = 201, description = "Created", body = AccountCreatedResponse),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Login, email or RUT already registered")
    )
)]
pub async fn create_account(
    user: AuthUser,
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CreateAccountRequest>,
) -> AppResult<(StatusCode, Json<AccountCreatedResponse>)> {
    user.require_admin()?;
    let draft = validate_new_account(&payload)?;

    if state
        .repo
        .account_conflict(Some(&draft.usuario), &draft.email, &draft.rut, None)
        .await?
    {
        return Err(AppError::Conflict(
            "El usuario, email o RUT ya existe".to_string(),
        ));
    }

    let password = temporary_password();
    let account = NewAccount {
        usuario: draft.usuario,
        nombre: draft.nombre,
        email: draft.email,
        rol: draft.rol.as_str().to_string(),
        estado: AccountStatus::Activa.as_str().to_string(),
        rut: draft.rut,
        id_direccion: draft.id_direccion,
        id_area: draft.id_area,
        password_hash: auth::hash_password(&password)?,
    };

    let created = state.repo.create_account(account).await?;
    tracing::info!(account_id = %created.id, by = %user.id, "account created");

    Ok((
        StatusCode::CREATED,
        Json(AccountCreatedResponse {
            success: true,
            message: "Usuario creado exitosamente".to_string(),
            user: created,
            temporary_password: password,
        }),
    ))
}

/// update_account
///
/// [Admin Route] Edits an account. The login name is immutable; email and RUT must stay
/// unique across accounts.
#[utoipa::path(
    put,
    path = "/api/usuarios",
    request_body = UpdateAccountRequest,
    responses(
        (status = 200, description = "Updated", body = Account),
        (status = 404, description = "Not Found"),
        (status = 409, description = "Email or RUT used by another account")
    )
)]
pub async fn update_account(
    user: AuthUser,
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<UpdateAccountRequest>,
) -> AppResult<Json<Value>> {
    user.require_admin()?;
    let (id, changes) = validate_account_update(&payload)?;

    if state.repo.get_account(id).await?.is_none() {
        return Err(account_not_found());
    }
    if state
        .repo
        .account_conflict(None, &changes.email, &changes.rut, Some(id))
        .await?
    {
        return Err(AppError::Conflict(
            "El email o RUT ya está en uso por otro usuario".to_string(),
        ));
    }

    let updated = state
        .repo
        .update_account(id, changes)
        .await?
        .ok_or_else(account_not_found)?;

    Ok(Json(json!({
        "success": true,
        "message": "Usuario actualizado exitosamente",
        "user": updated,
    })))
}

/// delete_account
///
/// [Admin Route] Deletes the account named by `?id=`.
#[utoipa::path(
    delete,
    path = "/api/usuarios",
    params(IdParam),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_account(
    user: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<IdParam>,
) -> AppResult<Json<MessageResponse>> {
    user.require_admin()?;
    let id = parse_id(params.id.as_deref(), "ID de usuario requerido")?;

    if !state.repo.delete_account(id).await? {
        return Err(account_not_found());
    }

    tracing::info!(account_id = %id, by = %user.id, "account deleted");
    Ok(Json(MessageResponse::ok("Usuario eliminado exitosamente")))
}
