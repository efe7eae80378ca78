/// Router Module Index
///
/// Routes are split by the access they require, so the authentication layer is attached
/// per module instead of per handler.

/// Routes open to anonymous clients.
pub mod public;

/// Routes requiring any valid session.
pub mod authenticated;

/// Routes restricted to the `Administrador` role.
pub mod admin;
