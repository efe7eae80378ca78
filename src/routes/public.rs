use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a session: login and the read-only directory.
/// Paths are relative to the `/api` prefix applied in `create_router`.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // POST /api/auth/login
        // Exchanges usuario/contraseña for a session token.
        .route("/auth/login", post(handlers::login))
        // GET /api/contactos?search=...
        // The public directory, grouped per number. Bare array.
        .route("/contactos", get(handlers::list_contacts))
        // GET /api/contactos/{id}
        // One number with its directory users, for the edit form.
        .route("/contactos/{id}", get(handlers::get_contact))
}
