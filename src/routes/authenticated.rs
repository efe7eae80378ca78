use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Authenticated Router Module
///
/// Routes open to any account holding a valid session, whatever its role.
/// The `auth_middleware` layer applied in `create_router` rejects requests without one.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /api/auth/me
        .route("/auth/me", get(handlers::get_me))
        // POST /api/usuarios/change-own-password
        // Always acts on the token's own account.
        .route(
            "/usuarios/change-own-password",
            post(handlers::change_own_password),
        )
        // GET /api/cargos | direcciones | unidades | ubicaciones
        // Suggestion lists for the admin forms. Unknown table names answer 404.
        .route("/{lookup}", get(handlers::list_lookup))
}
