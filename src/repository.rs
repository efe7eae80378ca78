use crate::{
    directory::{FanOut, plan_fan_out},
    error::AppResult,
    models::{
        Account, AccountChanges, AccountCredentials, AccountListing, ContactDetail, ContactDraft,
        ContactWriteOutcome, DirectoryRow, DirectoryUser, LookupEntry, LookupInput, LookupKind,
        NewAccount, PhoneNumber,
    },
};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use uuid::Uuid;

/// Repository Trait
///
/// The persistence contract used by handlers and the auth extractor. Every method reports
/// driver failures as `AppError` so handlers can answer 500 without guessing.
///
/// `Send + Sync + async_trait` let the trait object live behind `Arc<dyn Repository>` in the
/// shared state.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Accounts ---
    async fn get_account(&self, id: Uuid) -> AppResult<Option<Account>>;
    async fn find_credentials(&self, usuario: &str) -> AppResult<Option<AccountCredentials>>;
    async fn get_credentials(&self, id: Uuid) -> AppResult<Option<AccountCredentials>>;
    async fn list_accounts(&self) -> AppResult<Vec<AccountListing>>;
    /// True when another account already uses the login, email or RUT. `usuario` is only
    /// checked when given; `exclude` skips the account being edited.
    async fn account_conflict(
        &self,
        usuario: Option<&str>,
        email: &str,
        rut: &str,
        exclude: Option<Uuid>,
    ) -> AppResult<bool>;
    async fn create_account(&self, account: NewAccount) -> AppResult<Account>;
    async fn update_account(&self, id: Uuid, changes: AccountChanges) -> AppResult<Option<Account>>;
    async fn delete_account(&self, id: Uuid) -> AppResult<bool>;
    async fn set_password(&self, id: Uuid, password_hash: &str) -> AppResult<bool>;

    // --- Lookup tables ---
    async fn list_lookup(&self, kind: LookupKind) -> AppResult<Vec<LookupEntry>>;
    async fn lookup_name_taken(
        &self,
        kind: LookupKind,
        nombre: &str,
        exclude: Option<Uuid>,
    ) -> AppResult<bool>;
    async fn create_lookup(&self, kind: LookupKind, input: LookupInput) -> AppResult<LookupEntry>;
    async fn update_lookup(
        &self,
        kind: LookupKind,
        id: Uuid,
        input: LookupInput,
    ) -> AppResult<Option<LookupEntry>>;
    async fn delete_lookup(&self, kind: LookupKind, id: Uuid) -> AppResult<bool>;

    // --- Contacts ---
    /// Flat join rows ordered by tipo, numero.
    async fn directory_rows(&self) -> AppResult<Vec<DirectoryRow>>;
    async fn get_contact(&self, id: Uuid) -> AppResult<Option<ContactDetail>>;
    async fn contact_exists(&self, id: Uuid) -> AppResult<bool>;
    async fn numero_taken(&self, numero: &str, exclude: Option<Uuid>) -> AppResult<bool>;
    /// Inserts the number and its users atomically.
    async fn create_contact(&self, draft: ContactDraft) -> AppResult<ContactWriteOutcome>;
    /// Replaces the number's fields and user list atomically. `None` when the id is unknown.
    async fn update_contact(
        &self,
        id: Uuid,
        draft: ContactDraft,
    ) -> AppResult<Option<ContactWriteOutcome>>;
    /// Removes the number, its relations and the users it orphaned. False when unknown.
    async fn delete_contact(&self, id: Uuid) -> AppResult<bool>;
}

/// RepositoryState
///
/// The shared handle stored in `AppState`.
pub type RepositoryState = Arc<dyn Repository>;

/// PostgresRepository
///
/// `Repository` backed by PostgreSQL through a sqlx pool.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts the planned users and relations inside `tx`.
    async fn insert_fan_out(tx: &mut Transaction<'_, Postgres>, plan: &FanOut) -> AppResult<()> {
        for user in &plan.users {
            sqlx::query("INSERT INTO usuarios_numeros (id, nombre, cargo) VALUES ($1, $2, $3)")
                .bind(user.id)
                .bind(&user.nombre)
                .bind(&user.cargo)
                .execute(&mut **tx)
                .await?;
        }
        for rel in &plan.relations {
            sqlx::query(
                "INSERT INTO usuarios_numeros_rel (id, id_usuario, id_numero) VALUES ($1, $2, $3)",
            )
            .bind(rel.id)
            .bind(rel.id_usuario)
            .bind(rel.id_numero)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    /// Drops every relation of `numero_id` and then the users that lost their last relation.
    /// Only users that were linked to this number are considered.
    async fn detach_users(tx: &mut Transaction<'_, Postgres>, numero_id: Uuid) -> AppResult<u64> {
        let candidates: Vec<Uuid> = sqlx::query_scalar(
            "DELETE FROM usuarios_numeros_rel WHERE id_numero = $1 RETURNING id_usuario",
        )
        .bind(numero_id)
        .fetch_all(&mut **tx)
        .await?;

        if candidates.is_empty() {
            return Ok(0);
        }

        let swept = sqlx::query(
            r#"
            DELETE FROM usuarios_numeros un
            WHERE un.id = ANY($1)
              AND NOT EXISTS (
                  SELECT 1 FROM usuarios_numeros_rel r WHERE r.id_usuario = un.id
              )
            "#,
        )
        .bind(&candidates)
        .execute(&mut **tx)
        .await?;

        Ok(swept.rows_affected())
    }
}

const ACCOUNT_COLUMNS: &str =
    "id, usuario, nombre, email, rol, estado, rut, id_direccion, id_area";

const CREDENTIAL_COLUMNS: &str = r#"id, usuario, nombre, email, rol, estado, "contraseña""#;

const NUMBER_COLUMNS: &str = "id, numero, tipo, direccion, unidad, ubicacion, sigla";

fn lookup_select(kind: LookupKind) -> String {
    let sigla = if kind.has_sigla() { "sigla" } else { "NULL::VARCHAR AS sigla" };
    format!("SELECT id, nombre, {} FROM {}", sigla, kind.table())
}

fn lookup_returning(kind: LookupKind) -> &'static str {
    if kind.has_sigla() {
        "RETURNING id, nombre, sigla"
    } else {
        "RETURNING id, nombre, NULL::VARCHAR AS sigla"
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_account(&self, id: Uuid) -> AppResult<Option<Account>> {
        let sql = format!("SELECT {} FROM usuarios WHERE id = $1", ACCOUNT_COLUMNS);
        let account = sqlx::query_as::<_, Account>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(account)
    }

    async fn find_credentials(&self, usuario: &str) -> AppResult<Option<AccountCredentials>> {
        let sql = format!("SELECT {} FROM usuarios WHERE usuario = $1", CREDENTIAL_COLUMNS);
        let row = sqlx::query_as::<_, AccountCredentials>(&sql)
            .bind(usuario)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn get_credentials(&self, id: Uuid) -> AppResult<Option<AccountCredentials>> {
        let sql = format!("SELECT {} FROM usuarios WHERE id = $1", CREDENTIAL_COLUMNS);
        let row = sqlx::query_as::<_, AccountCredentials>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// list_accounts
    ///
    /// `id_area` points at the `unidad` table; both names are optional joins.
    async fn list_accounts(&self) -> AppResult<Vec<AccountListing>> {
        let rows = sqlx::query_as::<_, AccountListing>(
            r#"
            SELECT u.id, u.usuario, u.nombre, u.email, u.rol, u.estado, u.rut,
                   u.id_direccion, u.id_area,
                   d.nombre AS nombre_direccion, a.nombre AS nombre_area
            FROM usuarios u
            LEFT JOIN direccion d ON u.id_direccion = d.id
            LEFT JOIN unidad a ON u.id_area = a.id
            ORDER BY u.nombre
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn account_conflict(
        &self,
        usuario: Option<&str>,
        email: &str,
        rut: &str,
        exclude: Option<Uuid>,
    ) -> AppResult<bool> {
        let taken: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM usuarios
                WHERE (($1::VARCHAR IS NOT NULL AND usuario = $1) OR email = $2 OR rut = $3)
                  AND ($4::UUID IS NULL OR id <> $4)
            )
            "#,
        )
        .bind(usuario)
        .bind(email)
        .bind(rut)
        .bind(exclude)
        .fetch_one(&self.pool)
        .await?;
        Ok(taken)
    }

    async fn create_account(&self, account: NewAccount) -> AppResult<Account> {
        let sql = format!(
            r#"
            INSERT INTO usuarios (id, usuario, nombre, email, rol, estado, rut, id_direccion, id_area, "contraseña")
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        );
        let created = sqlx::query_as::<_, Account>(&sql)
            .bind(Uuid::new_v4())
            .bind(&account.usuario)
            .bind(&account.nombre)
            .bind(&account.email)
            .bind(&account.rol)
            .bind(&account.estado)
            .bind(&account.rut)
            .bind(account.id_direccion)
            .bind(account.id_area)
            .bind(&account.password_hash)
            .fetch_one(&self.pool)
            .await?;
        Ok(created)
    }

    async fn update_account(&self, id: Uuid, changes: AccountChanges) -> AppResult<Option<Account>> {
        let sql = format!(
            r#"
            UPDATE usuarios
            SET nombre = $2, email = $3, rol = $4, estado = $5, rut = $6,
                id_direccion = $7, id_area = $8
            WHERE id = $1
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        );
        let updated = sqlx::query_as::<_, Account>(&sql)
            .bind(id)
            .bind(&changes.nombre)
            .bind(&changes.email)
            .bind(&changes.rol)
            .bind(&changes.estado)
            .bind(&changes.rut)
            .bind(changes.id_direccion)
            .bind(changes.id_area)
            .fetch_optional(&self.pool)
            .await?;
        Ok(updated)
    }

    async fn delete_account(&self, id: Uuid) -> AppResult<bool> {
        let res = sqlx::query("DELETE FROM usuarios WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn set_password(&self, id: Uuid, password_hash: &str) -> AppResult<bool> {
        let res = sqlx::query(r#"UPDATE usuarios SET "contraseña" = $1 WHERE id = $2"#)
            .bind(password_hash)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    // --- LOOKUPS ---

    async fn list_lookup(&self, kind: LookupKind) -> AppResult<Vec<LookupEntry>> {
        let sql = format!("{} ORDER BY nombre", lookup_select(kind));
        let rows = sqlx::query_as::<_, LookupEntry>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn lookup_name_taken(
        &self,
        kind: LookupKind,
        nombre: &str,
        exclude: Option<Uuid>,
    ) -> AppResult<bool> {
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE LOWER(nombre) = LOWER($1) AND ($2::UUID IS NULL OR id <> $2))",
            kind.table()
        );
        let taken: bool = sqlx::query_scalar(&sql)
            .bind(nombre)
            .bind(exclude)
            .fetch_one(&self.pool)
            .await?;
        Ok(taken)
    }

    async fn create_lookup(&self, kind: LookupKind, input: LookupInput) -> AppResult<LookupEntry> {
        let id = Uuid::new_v4();
        let entry = if kind.has_sigla() {
            let sql = format!(
                "INSERT INTO {} (id, nombre, sigla) VALUES ($1, $2, $3) {}",
                kind.table(),
                lookup_returning(kind)
            );
            sqlx::query_as::<_, LookupEntry>(&sql)
                .bind(id)
                .bind(&input.nombre)
                .bind(&input.sigla)
                .fetch_one(&self.pool)
                .await?
        } else {
            let sql = format!(
                "INSERT INTO {} (id, nombre) VALUES ($1, $2) {}",
                kind.table(),
                lookup_returning(kind)
            );
            sqlx::query_as::<_, LookupEntry>(&sql)
                .bind(id)
                .bind(&input.nombre)
                .fetch_one(&self.pool)
                .await?
        };
        Ok(entry)
    }

    async fn update_lookup(
        &self,
        kind: LookupKind,
        id: Uuid,
        input: LookupInput,
    ) -> AppResult<Option<LookupEntry>> {
        let entry = if kind.has_sigla() {
            let sql = format!(
                "UPDATE {} SET nombre = $2, sigla = $3 WHERE id = $1 {}",
                kind.table(),
                lookup_returning(kind)
            );
            sqlx::query_as::<_, LookupEntry>(&sql)
                .bind(id)
                .bind(&input.nombre)
                .bind(&input.sigla)
                .fetch_optional(&self.pool)
                .await?
        } else {
            let sql = format!(
                "UPDATE {} SET nombre = $2 WHERE id = $1 {}",
                kind.table(),
                lookup_returning(kind)
            );
            sqlx::query_as::<_, LookupEntry>(&sql)
                .bind(id)
                .bind(&input.nombre)
                .fetch_optional(&self.pool)
                .await?
        };
        Ok(entry)
    }

    async fn delete_lookup(&self, kind: LookupKind, id: Uuid) -> AppResult<bool> {
        let sql = format!("DELETE FROM {} WHERE id = $1", kind.table());
        let res = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(res.rows_affected() > 0)
    }

    // --- CONTACTS ---

    async fn directory_rows(&self) -> AppResult<Vec<DirectoryRow>> {
        let rows = sqlx::query_as::<_, DirectoryRow>(
            r#"
            SELECT n.id, n.numero, n.tipo, n.direccion, n.unidad, n.ubicacion, n.sigla,
                   un.nombre, un.cargo
            FROM numeros n
            LEFT JOIN usuarios_numeros_rel unr ON n.id = unr.id_numero
            LEFT JOIN usuarios_numeros un ON unr.id_usuario = un.id
            ORDER BY n.tipo, n.numero, n.id, un.nombre
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_contact(&self, id: Uuid) -> AppResult<Option<ContactDetail>> {
        let sql = format!("SELECT {} FROM numeros WHERE id = $1", NUMBER_COLUMNS);
        let Some(number) = sqlx::query_as::<_, PhoneNumber>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let usuarios = sqlx::query_as::<_, DirectoryUser>(
            r#"
            SELECT un.id, un.nombre, un.cargo
            FROM usuarios_numeros un
            JOIN usuarios_numeros_rel unr ON unr.id_usuario = un.id
            WHERE unr.id_numero = $1
            ORDER BY un.nombre
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(ContactDetail::new(number, usuarios)))
    }

    async fn contact_exists(&self, id: Uuid) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM numeros WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn numero_taken(&self, numero: &str, exclude: Option<Uuid>) -> AppResult<bool> {
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM numeros WHERE numero = $1 AND ($2::UUID IS NULL OR id <> $2))",
        )
        .bind(numero)
        .bind(exclude)
        .fetch_one(&self.pool)
        .await?;
        Ok(taken)
    }

    /// create_contact
    ///
    /// Number, users and relations are written in one transaction; dropping `tx` on an
    /// early `?` rolls everything back.
    async fn create_contact(&self, draft: ContactDraft) -> AppResult<ContactWriteOutcome> {
        let id = Uuid::new_v4();
        let plan = plan_fan_out(id, &draft.usuarios);

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO numeros (id, numero, tipo, direccion, unidad, ubicacion, sigla)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(id)
        .bind(&draft.numero)
        .bind(draft.tipo.as_str())
        .bind(&draft.direccion)
        .bind(&draft.unidad)
        .bind(&draft.ubicacion)
        .bind(&draft.sigla)
        .execute(&mut *tx)
        .await?;

        Self::insert_fan_out(&mut tx, &plan).await?;
        tx.commit().await?;

        tracing::info!(contact_id = %id, users = plan.created(), "contact created");
        Ok(ContactWriteOutcome {
            id,
            usuarios_creados: plan.created(),
        })
    }

    async fn update_contact(
        &self,
        id: Uuid,
        draft: ContactDraft,
    ) -> AppResult<Option<ContactWriteOutcome>> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE numeros
            SET numero = $2, tipo = $3, direccion = $4, unidad = $5, ubicacion = $6, sigla = $7
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&draft.numero)
        .bind(draft.tipo.as_str())
        .bind(&draft.direccion)
        .bind(&draft.unidad)
        .bind(&draft.ubicacion)
        .bind(&draft.sigla)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let swept = Self::detach_users(&mut tx, id).await?;
        let plan = plan_fan_out(id, &draft.usuarios);
        Self::insert_fan_out(&mut tx, &plan).await?;
        tx.commit().await?;

        tracing::info!(contact_id = %id, swept, users = plan.created(), "contact updated");
        Ok(Some(ContactWriteOutcome {
            id,
            usuarios_creados: plan.created(),
        }))
    }

    async fn delete_contact(&self, id: Uuid) -> AppResult<bool> {
        let mut tx = self.pool.begin().await?;

        let swept = Self::detach_users(&mut tx, id).await?;
        let deleted = sqlx::query("DELETE FROM numeros WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if deleted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        tx.commit().await?;
        tracing::info!(contact_id = %id, swept, "contact deleted");
        Ok(true)
    }
}
