use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Admin Router Module
///
/// Every mutation of the directory, the suggestion tables and the account registry.
///
/// Access Control:
/// The router is wrapped in the authentication layer (401 without a valid session) and each
/// handler additionally calls `AuthUser::require_admin` (403 for any role other than
/// `Administrador`).
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // --- Directory ---
        // POST /api/contactos
        .route("/contactos", post(handlers::create_contact))
        // PUT/DELETE /api/contactos/{id}
        // Update rewrites the user list; delete sweeps the users left without a number.
        .route(
            "/contactos/{id}",
            put(handlers::update_contact).delete(handlers::delete_contact),
        )
        // --- Accounts ---
        // GET/POST/PUT/DELETE /api/usuarios (PUT carries the id in the body, DELETE in ?id=)
        .route(
            "/usuarios",
            get(handlers::list_accounts)
                .post(handlers::create_account)
                .put(handlers::update_account)
                .delete(handlers::delete_account),
        )
        // --- Suggestion tables ---
        // POST/PUT/DELETE /api/cargos | direcciones | unidades | ubicaciones
        .route(
            "/{lookup}",
            post(handlers::create_lookup)
                .put(handlers::update_lookup)
                .delete(handlers::delete_lookup),
        )
}
