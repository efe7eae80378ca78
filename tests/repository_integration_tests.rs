//! Exercises `PostgresRepository` against a live database.
//!
//! Run with `DATABASE_URL` pointing at a disposable Postgres and `--ignored`.

use directorio::{
    models::{
        AccountChanges, ContactDraft, ContactUserInput, LookupInput, LookupKind, NewAccount,
        PhoneType,
    },
    repository::{PostgresRepository, Repository},
};
use rand::Rng;
use sqlx::PgPool;
use tokio::test;
use uuid::Uuid;

// --- Test Context and Setup ---

struct DbTestContext {
    pool: PgPool,
}

impl DbTestContext {
    async fn setup() -> Self {
        dotenv::dotenv().ok();

        let db_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set to run integration tests");

        let pool = PgPool::connect(&db_url)
            .await
            .expect("Failed to connect to database for integration tests.");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run database migrations.");

        DbTestContext { pool }
    }

    fn repository(&self) -> PostgresRepository {
        PostgresRepository::new(self.pool.clone())
    }

    async fn count(&self, sql: &str, id: Uuid) -> i64 {
        sqlx::query_scalar(sql)
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .expect("count query failed")
    }

    async fn relations_of(&self, numero_id: Uuid) -> i64 {
        self.count(
            "SELECT COUNT(*) FROM usuarios_numeros_rel WHERE id_numero = $1",
            numero_id,
        )
        .await
    }

    async fn user_exists(&self, user_id: Uuid) -> bool {
        self.count("SELECT COUNT(*) FROM usuarios_numeros WHERE id = $1", user_id)
            .await
            > 0
    }
}

// --- Test Data Helpers ---

/// An 8-digit mobile number unlikely to collide with leftovers of earlier runs.
fn random_movil() -> String {
    let n: u32 = rand::thread_rng().gen_range(10_000_000..100_000_000);
    n.to_string()
}

fn unique(label: &str) -> String {
    format!("{} {}", label, Uuid::new_v4().simple())
}

fn draft(numero: String, tipo: PhoneType, usuarios: &[(&str, &str)]) -> ContactDraft {
    ContactDraft {
        numero,
        tipo,
        direccion: "Dirección de Obras".to_string(),
        unidad: "Permisos".to_string(),
        ubicacion: "Edificio B".to_string(),
        sigla: Some("DOM".to_string()),
        usuarios: usuarios
            .iter()
            .map(|(nombre, cargo)| ContactUserInput {
                nombre: nombre.to_string(),
                cargo: cargo.to_string(),
            })
            .collect(),
    }
}

/// A free extension number; retries on the rare collision with existing rows.
async fn free_fijo(repo: &PostgresRepository) -> String {
    loop {
        let n: u16 = rand::thread_rng().gen_range(1000..10000);
        let candidate = n.to_string();
        if !repo.numero_taken(&candidate, None).await.unwrap() {
            return candidate;
        }
    }
}

// --- Contacts ---

#[test]
#[ignore]
async fn test_create_contact_fans_out_users() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let numero = free_fijo(&repo).await;

    let outcome = repo
        .create_contact(draft(
            numero.clone(),
            PhoneType::Fijo,
            &[("Ana", "Jefa"), ("Luis", "Técnico"), ("Luis", "Técnico")],
        ))
        .await
        .unwrap();

    assert_eq!(outcome.usuarios_creados, 3);
    assert_eq!(ctx.relations_of(outcome.id).await, 3);
    assert!(repo.contact_exists(outcome.id).await.unwrap());
    assert!(!repo.contact_exists(Uuid::new_v4()).await.unwrap());
    assert!(repo.numero_taken(&numero, None).await.unwrap());
    assert!(!repo.numero_taken(&numero, Some(outcome.id)).await.unwrap());

    let detail = repo.get_contact(outcome.id).await.unwrap().unwrap();
    assert_eq!(detail.numero, numero);
    assert_eq!(detail.tipo, "Fijo");
    assert_eq!(detail.sigla.as_deref(), Some("DOM"));
    assert_eq!(detail.usuarios.len(), 3);

    let rows = repo.directory_rows().await.unwrap();
    assert_eq!(rows.iter().filter(|r| r.id == outcome.id).count(), 3);

    assert!(repo.delete_contact(outcome.id).await.unwrap());
}

#[test]
#[ignore]
async fn test_update_contact_replaces_users_and_sweeps_orphans() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();

    let outcome = repo
        .create_contact(draft(
            free_fijo(&repo).await,
            PhoneType::Fijo,
            &[("Marta", "Secretaria"), ("Jorge", "Auxiliar")],
        ))
        .await
        .unwrap();
    let before = repo.get_contact(outcome.id).await.unwrap().unwrap();

    let new_numero = random_movil();
    let updated = repo
        .update_contact(
            outcome.id,
            draft(new_numero.clone(), PhoneType::Movil, &[("Marta", "Inspectora")]),
        )
        .await
        .unwrap()
        .expect("contact should exist");

    assert_eq!(updated.id, outcome.id);
    assert_eq!(updated.usuarios_creados, 1);
    assert_eq!(ctx.relations_of(outcome.id).await, 1);
    for old in &before.usuarios {
        assert!(!ctx.user_exists(old.id).await, "orphan {} left behind", old.id);
    }

    let after = repo.get_contact(outcome.id).await.unwrap().unwrap();
    assert_eq!(after.numero, new_numero);
    assert_eq!(after.tipo, "Móvil");
    assert_eq!(after.usuarios[0].cargo, "Inspectora");

    assert!(
        repo.update_contact(Uuid::new_v4(), draft(random_movil(), PhoneType::Movil, &[]))
            .await
            .unwrap()
            .is_none()
    );

    assert!(repo.delete_contact(outcome.id).await.unwrap());
}

#[test]
#[ignore]
async fn test_orphan_sweep_keeps_users_linked_elsewhere() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();

    let first = repo
        .create_contact(draft(free_fijo(&repo).await, PhoneType::Fijo, &[("Rosa", "Jefa")]))
        .await
        .unwrap();
    let second = repo
        .create_contact(draft(free_fijo(&repo).await, PhoneType::Fijo, &[]))
        .await
        .unwrap();

    // Link the first contact's user to the second number as well.
    let shared = repo.get_contact(first.id).await.unwrap().unwrap().usuarios[0].id;
    sqlx::query("INSERT INTO usuarios_numeros_rel (id, id_usuario, id_numero) VALUES ($1, $2, $3)")
        .bind(Uuid::new_v4())
        .bind(shared)
        .bind(second.id)
        .execute(&ctx.pool)
        .await
        .unwrap();

    assert!(repo.delete_contact(first.id).await.unwrap());
    assert!(ctx.user_exists(shared).await);
    assert_eq!(ctx.relations_of(second.id).await, 1);

    assert!(repo.delete_contact(second.id).await.unwrap());
    assert!(!ctx.user_exists(shared).await);
    assert!(!repo.delete_contact(second.id).await.unwrap());
}

#[test]
#[ignore]
async fn test_duplicate_numero_is_rejected_by_the_schema() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let numero = random_movil();

    let outcome = repo
        .create_contact(draft(numero.clone(), PhoneType::Movil, &[("Iván", "Chofer")]))
        .await
        .unwrap();

    let stray = unique("Otro");
    let err = repo
        .create_contact(draft(numero, PhoneType::Movil, &[(stray.as_str(), "Chofer")]))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), axum::http::StatusCode::CONFLICT);

    // The failed insert rolled back; no stray users were left.
    let strays: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM usuarios_numeros WHERE nombre = $1")
        .bind(&stray)
        .fetch_one(&ctx.pool)
        .await
        .unwrap();
    assert_eq!(strays, 0);

    assert!(repo.delete_contact(outcome.id).await.unwrap());
}

// --- Lookups ---

#[test]
#[ignore]
async fn test_lookup_crud() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let nombre = unique("Dirección de Prueba");

    let created = repo
        .create_lookup(
            LookupKind::Direccion,
            LookupInput {
                nombre: nombre.clone(),
                sigla: Some("DP".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(created.sigla.as_deref(), Some("DP"));

    assert!(
        repo.lookup_name_taken(LookupKind::Direccion, &nombre.to_uppercase(), None)
            .await
            .unwrap()
    );
    assert!(
        !repo
            .lookup_name_taken(LookupKind::Direccion, &nombre, Some(created.id))
            .await
            .unwrap()
    );
    assert!(
        !repo
            .lookup_name_taken(LookupKind::Unidad, &nombre, None)
            .await
            .unwrap()
    );

    let renamed = unique("Dirección Renombrada");
    let updated = repo
        .update_lookup(
            LookupKind::Direccion,
            created.id,
            LookupInput {
                nombre: renamed.clone(),
                sigla: None,
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.nombre, renamed);
    assert_eq!(updated.sigla, None);

    let listed = repo.list_lookup(LookupKind::Direccion).await.unwrap();
    assert!(listed.iter().any(|e| e.id == created.id));

    // Tables without an acronym column still decode.
    let cargo = repo
        .create_lookup(
            LookupKind::Cargo,
            LookupInput {
                nombre: unique("Cargo de Prueba"),
                sigla: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(cargo.sigla, None);

    assert!(repo.delete_lookup(LookupKind::Direccion, created.id).await.unwrap());
    assert!(repo.delete_lookup(LookupKind::Cargo, cargo.id).await.unwrap());
    assert!(!repo.delete_lookup(LookupKind::Cargo, cargo.id).await.unwrap());
}

// --- Accounts ---

#[test]
#[ignore]
async fn test_account_lifecycle() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let tag = Uuid::new_v4().simple().to_string();

    let unidad = repo
        .create_lookup(
            LookupKind::Unidad,
            LookupInput {
                nombre: unique("Unidad de Prueba"),
                sigla: None,
            },
        )
        .await
        .unwrap();

    let account = repo
        .create_account(NewAccount {
            usuario: format!("u{}", tag),
            nombre: "Cuenta de Prueba".to_string(),
            email: format!("{}@municipalidad.cl", tag),
            rol: "Editor".to_string(),
            estado: "Activa".to_string(),
            rut: format!("r{}", tag),
            id_direccion: None,
            id_area: Some(unidad.id),
            password_hash: bcrypt::hash("secreto1", 4).unwrap(),
        })
        .await
        .unwrap();

    let creds = repo.find_credentials(&account.usuario).await.unwrap().unwrap();
    assert!(bcrypt::verify("secreto1", &creds.password_hash).unwrap());

    assert!(
        repo.account_conflict(Some(&account.usuario), "otro@x.cl", "otro", None)
            .await
            .unwrap()
    );
    assert!(
        !repo
            .account_conflict(None, &account.email, &account.rut, Some(account.id))
            .await
            .unwrap()
    );

    let listing = repo.list_accounts().await.unwrap();
    let row = listing.iter().find(|a| a.id == account.id).unwrap();
    assert_eq!(row.nombre_area.as_deref(), Some(unidad.nombre.as_str()));

    let updated = repo
        .update_account(
            account.id,
            AccountChanges {
                nombre: "Cuenta Editada".to_string(),
                email: account.email.clone(),
                rol: "Supervisor".to_string(),
                estado: "Suspendida".to_string(),
                rut: account.rut.clone(),
                id_direccion: None,
                id_area: None,
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.rol, "Supervisor");
    assert_eq!(updated.estado, "Suspendida");

    assert!(repo.set_password(account.id, "nuevo-hash").await.unwrap());
    let creds = repo.get_credentials(account.id).await.unwrap().unwrap();
    assert_eq!(creds.password_hash, "nuevo-hash");

    assert!(repo.delete_account(account.id).await.unwrap());
    assert!(repo.get_account(account.id).await.unwrap().is_none());
    assert!(repo.delete_lookup(LookupKind::Unidad, unidad.id).await.unwrap());
}
