use directorio::models::{
    ChangeOwnPasswordRequest, ContactListing, ContactMutationResponse, ContactRequest,
    LoginRequest, LookupEntry, LookupKind, PhoneType,
};
use serde_json::json;
use uuid::Uuid;

// --- Wire names ---

#[test]
fn test_login_request_reads_accented_password_field() {
    let req: LoginRequest =
        serde_json::from_value(json!({ "usuario": "admin", "contraseña": "secreto" })).unwrap();
    assert_eq!(req.usuario, "admin");
    assert_eq!(req.password, "secreto");
}

#[test]
fn test_change_own_password_is_camel_case_and_ignores_user_id() {
    let req: ChangeOwnPasswordRequest = serde_json::from_value(json!({
        "userId": Uuid::new_v4(),
        "currentPassword": "vieja",
        "newPassword": "nueva123",
    }))
    .unwrap();
    assert_eq!(req.current_password, "vieja");
    assert_eq!(req.new_password, "nueva123");
}

#[test]
fn test_contact_mutation_response_uses_usuarios_creados() {
    let body = ContactMutationResponse {
        success: true,
        message: "Contacto creado exitosamente".to_string(),
        id: Uuid::new_v4(),
        usuarios_creados: 3,
    };
    let value = serde_json::to_value(&body).unwrap();
    assert_eq!(value["usuariosCreados"], 3);
    assert!(value.get("usuarios_creados").is_none());
}

#[test]
fn test_contact_listing_uses_additional_contacts() {
    let value = serde_json::to_value(ContactListing::default()).unwrap();
    assert!(value["additionalContacts"].is_array());
    assert!(value.get("additional_contacts").is_none());
}

#[test]
fn test_contact_request_defaults_missing_fields() {
    let req: ContactRequest = serde_json::from_value(json!({ "numero": "1234" })).unwrap();
    assert_eq!(req.numero, "1234");
    assert!(req.tipo.is_empty());
    assert!(req.usuarios.is_empty());
    assert!(req.sigla.is_none());
}

#[test]
fn test_phone_type_wire_spelling() {
    assert_eq!(serde_json::to_value(PhoneType::Movil).unwrap(), "Móvil");
    let parsed: PhoneType = serde_json::from_value(json!("Movil")).unwrap();
    assert_eq!(parsed, PhoneType::Movil);
    let accented: PhoneType = serde_json::from_value(json!("Móvil")).unwrap();
    assert_eq!(accented, PhoneType::Movil);
    assert!(serde_json::from_value::<PhoneType>(json!("Satelital")).is_err());

    assert_eq!(PhoneType::parse("Fijo"), Some(PhoneType::Fijo));
    assert_eq!(PhoneType::parse(" Móvil "), Some(PhoneType::Movil));
    assert_eq!(PhoneType::parse("Satelital"), None);
}

#[test]
fn test_lookup_entry_omits_absent_sigla() {
    let plain = LookupEntry {
        id: Uuid::new_v4(),
        nombre: "Director".to_string(),
        sigla: None,
    };
    assert!(serde_json::to_value(&plain).unwrap().get("sigla").is_none());
}

#[test]
fn test_lookup_kind_resolves_collection_segments() {
    for kind in LookupKind::ALL {
        assert_eq!(LookupKind::from_collection(kind.collection_key()), Some(kind));
    }
    assert_eq!(LookupKind::from_collection("usuarios"), None);
    assert!(LookupKind::Direccion.has_sigla());
    assert!(!LookupKind::Cargo.has_sigla());
}
