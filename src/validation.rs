//! Field rules for every write endpoint.
//!
//! Handlers call into this module and nothing else for digit lengths, required fields and
//! enum membership, so the rules exist in exactly one place.

use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        AccountChanges, ContactDraft, ContactRequest, ContactUserInput, CreateAccountRequest,
        LookupInput, LookupKind, LookupRequest, PhoneType, UpdateAccountRequest,
    },
};

/// Longest label accepted for free-text contact and lookup fields.
pub const MAX_LABEL_LEN: usize = 50;
/// Longest acronym accepted for a direction.
pub const MAX_SIGLA_LEN: usize = 20;
/// Column widths of the `usuarios` table.
pub const MAX_USUARIO_LEN: usize = 50;
pub const MAX_NOMBRE_LEN: usize = 100;
pub const MAX_EMAIL_LEN: usize = 255;
pub const MAX_RUT_LEN: usize = 20;
/// Shortest password accepted on change.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Role
///
/// Roles an account can hold. Only `Administrador` unlocks the admin routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Administrador,
    Revisor,
    Editor,
    Supervisor,
}

impl Role {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Administrador" => Some(Role::Administrador),
            "Revisor" => Some(Role::Revisor),
            "Editor" => Some(Role::Editor),
            "Supervisor" => Some(Role::Supervisor),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Administrador => "Administrador",
            Role::Revisor => "Revisor",
            Role::Editor => "Editor",
            Role::Supervisor => "Supervisor",
        }
    }
}

/// AccountStatus
///
/// Only `Activa` accounts may log in or hold a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountStatus {
    Activa,
    Desactivada,
    Suspendida,
}

impl AccountStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Activa" => Some(AccountStatus::Activa),
            "Desactivada" => Some(AccountStatus::Desactivada),
            "Suspendida" => Some(AccountStatus::Suspendida),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Activa => "Activa",
            AccountStatus::Desactivada => "Desactivada",
            AccountStatus::Suspendida => "Suspendida",
        }
    }
}

// --- Phone numbers ---

/// Strips every character that is not an ASCII digit.
pub fn normalize_numero(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Normalizes `raw` and checks its length against `tipo`.
pub fn validate_numero(raw: &str, tipo: PhoneType) -> AppResult<String> {
    if raw.trim().is_empty() {
        return Err(AppError::BadRequest("El número es requerido".to_string()));
    }

    let numero = normalize_numero(raw);
    if numero.len() != tipo.expected_digits() {
        let message = match tipo {
            PhoneType::Movil => "El número móvil debe tener exactamente 8 dígitos",
            PhoneType::Fijo => "El número fijo debe tener exactamente 4 dígitos",
        };
        return Err(AppError::BadRequest(message.to_string()));
    }
    Ok(numero)
}

fn required_label(value: &str, message: &str) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest(message.to_string()));
    }
    bounded_label(trimmed)
}

fn bounded_label(value: &str) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.chars().count() > MAX_LABEL_LEN {
        return Err(AppError::BadRequest(format!(
            "Los campos de texto no pueden superar {} caracteres",
            MAX_LABEL_LEN
        )));
    }
    Ok(trimmed.to_string())
}

fn optional_sigla(value: Option<&str>) -> AppResult<Option<String>> {
    match value.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) if s.chars().count() > MAX_SIGLA_LEN => Err(AppError::BadRequest(format!(
            "La sigla no puede superar {} caracteres",
            MAX_SIGLA_LEN
        ))),
        Some(s) => Ok(Some(s.to_string())),
    }
}

/// validate_contact
///
/// Turns a raw contact body into a `ContactDraft`. User entries with a blank `nombre` are
/// dropped; the remaining ones are trimmed and bounded by the per-type cap.
pub fn validate_contact(req: &ContactRequest) -> AppResult<ContactDraft> {
    if req.tipo.trim().is_empty() {
        return Err(AppError::BadRequest("El tipo es requerido".to_string()));
    }
    let tipo = PhoneType::parse(&req.tipo)
        .ok_or_else(|| AppError::BadRequest("Tipo inválido".to_string()))?;

    let numero = validate_numero(&req.numero, tipo)?;
    let direccion = required_label(&req.direccion, "La dirección es requerida")?;
    let unidad = required_label(&req.unidad, "La unidad es requerida")?;
    let ubicacion = match tipo {
        PhoneType::Fijo => required_label(
            &req.ubicacion,
            "La ubicación es requerida para números fijos",
        )?,
        PhoneType::Movil => bounded_label(&req.ubicacion)?,
    };
    let sigla = optional_sigla(req.sigla.as_deref())?;

    let mut usuarios = Vec::with_capacity(req.usuarios.len());
    for entry in req.usuarios.iter().filter(|u| !u.nombre.trim().is_empty()) {
        let nombre = bounded_label(&entry.nombre)?;
        let cargo = bounded_label(&entry.cargo)?;
        if tipo == PhoneType::Movil && cargo.is_empty() {
            return Err(AppError::BadRequest(
                "El cargo es requerido para números móviles".to_string(),
            ));
        }
        usuarios.push(ContactUserInput { nombre, cargo });
    }

    if usuarios.len() > tipo.max_users() {
        return Err(AppError::BadRequest(format!(
            "Un número {} admite como máximo {} usuario(s)",
            tipo.as_str(),
            tipo.max_users()
        )));
    }

    Ok(ContactDraft {
        numero,
        tipo,
        direccion,
        unidad,
        ubicacion,
        sigla,
        usuarios,
    })
}

// --- Lookups ---

pub fn validate_lookup(kind: LookupKind, req: &LookupRequest) -> AppResult<LookupInput> {
    let nombre = required_label(&req.nombre, "Nombre es requerido")?;
    let sigla = if kind.has_sigla() {
        optional_sigla(req.sigla.as_deref())?
    } else {
        None
    };
    Ok(LookupInput { nombre, sigla })
}

// --- Accounts ---

fn parse_role(value: &str) -> AppResult<Role> {
    Role::parse(value.trim()).ok_or_else(|| AppError::BadRequest("Rol inválido".to_string()))
}

fn parse_status(value: &str) -> AppResult<AccountStatus> {
    AccountStatus::parse(value.trim())
        .ok_or_else(|| AppError::BadRequest("Estado inválido".to_string()))
}

/// Rejects account fields wider than their column, so they never reach the database.
fn check_account_widths(fields: &[(&str, &str, usize)]) -> AppResult<()> {
    for (label, value, max) in fields {
        if value.chars().count() > *max {
            return Err(AppError::BadRequest(format!(
                "El campo {} no puede superar {} caracteres",
                label, max
            )));
        }
    }
    Ok(())
}

/// Validated fields of a new account, before the password is generated.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountDraft {
    pub usuario: String,
    pub nombre: String,
    pub email: String,
    pub rol: Role,
    pub rut: String,
    pub id_direccion: Option<Uuid>,
    pub id_area: Option<Uuid>,
}

pub fn validate_new_account(req: &CreateAccountRequest) -> AppResult<AccountDraft> {
    if req.rol.trim().is_empty() {
        return Err(AppError::BadRequest("Todos los campos son requeridos".to_string()));
    }
    let trimmed = CreateAccountRequest {
        nombre: req.nombre.trim().to_string(),
        usuario: req.usuario.trim().to_string(),
        email: req.email.trim().to_string(),
        rol: req.rol.trim().to_string(),
        rut: req.rut.trim().to_string(),
        ..req.clone()
    };
    trimmed.validate()?;
    check_account_widths(&[
        ("usuario", trimmed.usuario.as_str(), MAX_USUARIO_LEN),
        ("nombre", trimmed.nombre.as_str(), MAX_NOMBRE_LEN),
        ("email", trimmed.email.as_str(), MAX_EMAIL_LEN),
        ("rut", trimmed.rut.as_str(), MAX_RUT_LEN),
    ])?;

    Ok(AccountDraft {
        rol: parse_role(&trimmed.rol)?,
        usuario: trimmed.usuario,
        nombre: trimmed.nombre,
        email: trimmed.email,
        rut: trimmed.rut,
        id_direccion: trimmed.id_direccion,
        id_area: trimmed.id_area,
    })
}

/// Returns the target id and the validated changes.
pub fn validate_account_update(req: &UpdateAccountRequest) -> AppResult<(Uuid, AccountChanges)> {
    let id = req.id.ok_or_else(|| AppError::BadRequest("Todos los campos son requeridos".to_string()))?;
    if req.rol.trim().is_empty()
        || req.estado.trim().is_empty()
        || req.id_direccion.is_none()
        || req.id_area.is_none()
    {
        return Err(AppError::BadRequest("Todos los campos son requeridos".to_string()));
    }

    let trimmed = UpdateAccountRequest {
        nombre: req.nombre.trim().to_string(),
        email: req.email.trim().to_string(),
        rol: req.rol.trim().to_string(),
        estado: req.estado.trim().to_string(),
        rut: req.rut.trim().to_string(),
        ..req.clone()
    };
    trimmed.validate()?;
    check_account_widths(&[
        ("nombre", trimmed.nombre.as_str(), MAX_NOMBRE_LEN),
        ("email", trimmed.email.as_str(), MAX_EMAIL_LEN),
        ("rut", trimmed.rut.as_str(), MAX_RUT_LEN),
    ])?;

    let rol = parse_role(&trimmed.rol)?;
    let estado = parse_status(&trimmed.estado)?;

    Ok((
        id,
        AccountChanges {
            nombre: trimmed.nombre,
            email: trimmed.email,
            rol: rol.as_str().to_string(),
            estado: estado.as_str().to_string(),
            rut: trimmed.rut,
            id_direccion: trimmed.id_direccion,
            id_area: trimmed.id_area,
        },
    ))
}

pub fn validate_new_password(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "La nueva contraseña debe tener al menos {} caracteres",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// Parses an id coming from a path segment or query string.
pub fn parse_id(raw: Option<&str>, missing: &str) -> AppResult<Uuid> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest(missing.to_string()))?;
    Uuid::parse_str(raw).map_err(|_| AppError::BadRequest("ID inválido".to_string()))
}
