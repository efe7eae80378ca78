use serde::{Deserialize, Deserializer, Serialize, de};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Accounts (system login identities, table `usuarios`) ---

/// Account
///
/// A login identity as exposed through the API. The password hash never leaves the
/// repository in this shape; see `AccountCredentials`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct Account {
    pub id: Uuid,
    // Login name, unique.
    pub usuario: String,
    pub nombre: String,
    pub email: String,
    // 'Administrador' | 'Revisor' | 'Editor' | 'Supervisor'
    pub rol: String,
    // 'Activa' | 'Desactivada' | 'Suspendida'
    pub estado: String,
    pub rut: String,
    pub id_direccion: Option<Uuid>,
    pub id_area: Option<Uuid>,
}

/// AccountCredentials
///
/// Internal row used by login and password changes. Not serializable on purpose.
#[derive(Debug, Clone, FromRow)]
pub struct AccountCredentials {
    pub id: Uuid,
    pub usuario: String,
    pub nombre: String,
    pub email: String,
    pub rol: String,
    pub estado: String,
    #[sqlx(rename = "contraseña")]
    pub password_hash: String,
}

impl AccountCredentials {
    pub fn session_user(&self) -> SessionUser {
        SessionUser {
            id: self.id,
            usuario: self.usuario.clone(),
            nombre: self.nombre.clone(),
            email: self.email.clone(),
            rol: self.rol.clone(),
        }
    }
}

/// AccountListing
///
/// Admin table row: the account plus the names of its direction and unit.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct AccountListing {
    pub id: Uuid,
    pub usuario: String,
    pub nombre: String,
    pub email: String,
    pub rol: String,
    pub estado: String,
    pub rut: String,
    pub id_direccion: Option<Uuid>,
    pub id_area: Option<Uuid>,
    pub nombre_direccion: Option<String>,
    pub nombre_area: Option<String>,
}

/// Fields of a new account after validation and hashing.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub usuario: String,
    pub nombre: String,
    pub email: String,
    pub rol: String,
    pub estado: String,
    pub rut: String,
    pub id_direccion: Option<Uuid>,
    pub id_area: Option<Uuid>,
    pub password_hash: String,
}

/// Editable fields of an existing account.
#[derive(Debug, Clone)]
pub struct AccountChanges {
    pub nombre: String,
    pub email: String,
    pub rol: String,
    pub estado: String,
    pub rut: String,
    pub id_direccion: Option<Uuid>,
    pub id_area: Option<Uuid>,
}

/// SessionUser
///
/// Identity returned by login and `/api/auth/me`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct SessionUser {
    pub id: Uuid,
    pub usuario: String,
    pub nombre: String,
    pub email: String,
    pub rol: String,
}

// --- Auth payloads ---

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct LoginRequest {
    #[serde(default)]
    pub usuario: String,
    #[serde(default, rename = "contraseña")]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginResponse {
    pub success: bool,
    pub token: String,
    pub user: SessionUser,
}

/// ChangeOwnPasswordRequest
///
/// The account is always the one named by the bearer token; a `userId` sent by older
/// clients is accepted and ignored.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ChangeOwnPasswordRequest {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
}

// --- Account admin payloads ---

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, validator::Validate)]
#[ts(export)]
pub struct CreateAccountRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "Todos los campos son requeridos"))]
    pub nombre: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Todos los campos son requeridos"))]
    pub usuario: String,
    #[serde(default)]
    #[validate(email(message = "Email inválido"))]
    pub email: String,
    #[serde(default)]
    pub rol: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Todos los campos son requeridos"))]
    pub rut: String,
    #[serde(default)]
    pub id_direccion: Option<Uuid>,
    #[serde(default)]
    pub id_area: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, validator::Validate)]
#[ts(export)]
pub struct UpdateAccountRequest {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    #[validate(length(min = 1, message = "Todos los campos son requeridos"))]
    pub nombre: String,
    #[serde(default)]
    #[validate(email(message = "Email inválido"))]
    pub email: String,
    #[serde(default)]
    pub rol: String,
    #[serde(default)]
    pub estado: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Todos los campos son requeridos"))]
    pub rut: String,
    #[serde(default)]
    pub id_direccion: Option<Uuid>,
    #[serde(default)]
    pub id_area: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AccountsResponse {
    pub success: bool,
    pub users: Vec<AccountListing>,
}

/// AccountCreatedResponse
///
/// Carries the generated temporary password; it is shown once and never stored in clear.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AccountCreatedResponse {
    pub success: bool,
    pub message: String,
    pub user: Account,
    pub temporary_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn ok(message: &str) -> Self {
        Self {
            success: true,
            message: message.to_string(),
        }
    }
}

/// Query string carrying the target id for PUT/DELETE on collection routes (`?id=`).
#[derive(Debug, Clone, Deserialize, Default, utoipa::IntoParams)]
pub struct IdParam {
    pub id: Option<String>,
}

// --- Lookup tables (cargo, direccion, unidad, ubicacion) ---

/// LookupKind
///
/// The four suggestion tables. Each maps to a fixed table name, so table names are never
/// taken from user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupKind {
    Cargo,
    Direccion,
    Unidad,
    Ubicacion,
}

impl LookupKind {
    pub const ALL: [LookupKind; 4] = [
        LookupKind::Cargo,
        LookupKind::Direccion,
        LookupKind::Unidad,
        LookupKind::Ubicacion,
    ];

    pub fn table(&self) -> &'static str {
        match self {
            LookupKind::Cargo => "cargo",
            LookupKind::Direccion => "direccion",
            LookupKind::Unidad => "unidad",
            LookupKind::Ubicacion => "ubicacion",
        }
    }

    /// Key of the list in GET responses, e.g. `{"success": true, "cargos": [...]}`.
    pub fn collection_key(&self) -> &'static str {
        match self {
            LookupKind::Cargo => "cargos",
            LookupKind::Direccion => "direcciones",
            LookupKind::Unidad => "unidades",
            LookupKind::Ubicacion => "ubicaciones",
        }
    }

    /// Resolves the URL segment (`cargos`, `direcciones`, ...) to its kind.
    pub fn from_collection(segment: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.collection_key() == segment)
    }

    /// Only directions carry an acronym.
    pub fn has_sigla(&self) -> bool {
        matches!(self, LookupKind::Direccion)
    }

    pub fn label(&self) -> &'static str {
        match self {
            LookupKind::Cargo => "Cargo",
            LookupKind::Direccion => "Dirección",
            LookupKind::Unidad => "Unidad",
            LookupKind::Ubicacion => "Ubicación",
        }
    }

    /// Grammatical gender of the label, for response messages.
    pub fn is_feminine(&self) -> bool {
        !matches!(self, LookupKind::Cargo)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct LookupEntry {
    pub id: Uuid,
    pub nombre: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sigla: Option<String>,
}

/// Body of POST/PUT on lookup routes. `id` is only read on PUT.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct LookupRequest {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub nombre: String,
    #[serde(default)]
    pub sigla: Option<String>,
}

/// Validated lookup values.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupInput {
    pub nombre: String,
    pub sigla: Option<String>,
}

// --- Directory (numeros, usuarios_numeros, usuarios_numeros_rel) ---

/// PhoneType
///
/// `Fijo` is a 4-digit internal extension, `Móvil` an 8-digit mobile number.
/// Deserialization goes through `PhoneType::parse`, so the unaccented spelling is accepted.
#[derive(Debug, Clone, Copy, Serialize, TS, ToSchema, PartialEq, Eq)]
#[ts(export)]
pub enum PhoneType {
    Fijo,
    #[serde(rename = "Móvil")]
    Movil,
}

impl<'de> Deserialize<'de> for PhoneType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        PhoneType::parse(&raw).ok_or_else(|| de::Error::unknown_variant(&raw, &["Fijo", "Móvil"]))
    }
}

impl PhoneType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhoneType::Fijo => "Fijo",
            PhoneType::Movil => "Móvil",
        }
    }

    /// Accepts the stored spelling and the unaccented variant found in older rows.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "Fijo" => Some(PhoneType::Fijo),
            "Móvil" | "Movil" => Some(PhoneType::Movil),
            _ => None,
        }
    }

    pub fn expected_digits(&self) -> usize {
        match self {
            PhoneType::Fijo => 4,
            PhoneType::Movil => 8,
        }
    }

    /// Most directory users a number of this type may list.
    pub fn max_users(&self) -> usize {
        match self {
            PhoneType::Fijo => 5,
            PhoneType::Movil => 1,
        }
    }
}

/// PhoneNumber
///
/// A row of `numeros`. `numero` holds digits only.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct PhoneNumber {
    pub id: Uuid,
    pub numero: String,
    pub tipo: String,
    pub direccion: String,
    pub unidad: String,
    pub ubicacion: String,
    pub sigla: Option<String>,
}

/// DirectoryUser
///
/// A person listed next to a number (`usuarios_numeros`). Has no identity beyond its
/// relations; rows are recreated on every contact write.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct DirectoryUser {
    pub id: Uuid,
    pub nombre: String,
    pub cargo: String,
}

/// Relation
///
/// Join row of `usuarios_numeros_rel`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, Default, PartialEq)]
pub struct Relation {
    pub id: Uuid,
    pub id_usuario: Uuid,
    pub id_numero: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct ContactUserInput {
    #[serde(default)]
    pub nombre: String,
    #[serde(default)]
    pub cargo: String,
}

/// ContactRequest
///
/// Raw body of POST/PUT `/api/contactos`. Everything defaults so that missing fields surface
/// as validation messages instead of deserialization failures.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ContactRequest {
    #[serde(default)]
    pub numero: String,
    #[serde(default)]
    pub tipo: String,
    #[serde(default)]
    pub direccion: String,
    #[serde(default)]
    pub unidad: String,
    #[serde(default)]
    pub ubicacion: String,
    #[serde(default)]
    pub sigla: Option<String>,
    #[serde(default)]
    pub usuarios: Vec<ContactUserInput>,
}

/// ContactDraft
///
/// A contact that passed validation: normalized number, typed `tipo`, trimmed labels and
/// only the non-blank user entries.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactDraft {
    pub numero: String,
    pub tipo: PhoneType,
    pub direccion: String,
    pub unidad: String,
    pub ubicacion: String,
    pub sigla: Option<String>,
    pub usuarios: Vec<ContactUserInput>,
}

/// Result of a create/update fan-out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactWriteOutcome {
    pub id: Uuid,
    pub usuarios_creados: usize,
}

/// ContactDetail
///
/// One number with all its directory users, used by the edit form.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct ContactDetail {
    pub id: Uuid,
    pub numero: String,
    pub tipo: String,
    pub direccion: String,
    pub unidad: String,
    pub ubicacion: String,
    pub sigla: Option<String>,
    pub usuarios: Vec<DirectoryUser>,
}

impl ContactDetail {
    pub fn new(number: PhoneNumber, usuarios: Vec<DirectoryUser>) -> Self {
        Self {
            id: number.id,
            numero: number.numero,
            tipo: number.tipo,
            direccion: number.direccion,
            unidad: number.unidad,
            ubicacion: number.ubicacion,
            sigla: number.sigla,
            usuarios,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ContactDetailResponse {
    pub success: bool,
    pub contacto: ContactDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ContactMutationResponse {
    pub success: bool,
    pub message: String,
    pub id: Uuid,
    #[serde(rename = "usuariosCreados")]
    pub usuarios_creados: usize,
}

/// DirectoryRow
///
/// One row of `numeros LEFT JOIN rel LEFT JOIN usuarios_numeros`; a number with three users
/// yields three rows, a number without users yields one row with empty user columns.
#[derive(Debug, Clone, FromRow, Default, PartialEq)]
pub struct DirectoryRow {
    pub id: Uuid,
    pub numero: String,
    pub tipo: String,
    pub direccion: String,
    pub unidad: String,
    pub ubicacion: String,
    pub sigla: Option<String>,
    pub nombre: Option<String>,
    pub cargo: Option<String>,
}

/// ContactListing
///
/// Public directory entry, one per number.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct ContactListing {
    pub id: Uuid,
    // The extension for Fijo numbers, empty for Móvil.
    pub anexo: String,
    // Display form; Móvil numbers carry the +569 prefix.
    pub numero: String,
    pub tipo: String,
    pub nombre: String,
    pub direccion: String,
    pub unidad: String,
    pub cargo: String,
    pub ubicacion: String,
    pub sigla: String,
    #[serde(rename = "additionalContacts")]
    pub additional_contacts: Vec<AdditionalContact>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct AdditionalContact {
    pub nombre: String,
    pub unidad: String,
    pub cargo: String,
    pub direccion: String,
    pub ubicacion: String,
}
