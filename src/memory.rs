//! Process-local `Repository` used by the test-suite and for running the API without a
//! database. It keeps the same uniqueness rules and fan-out semantics as the SQL schema.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    directory::{listing_order, orphaned_candidates, plan_fan_out},
    error::{AppError, AppResult},
    models::{
        Account, AccountChanges, AccountCredentials, AccountListing, ContactDetail, ContactDraft,
        ContactWriteOutcome, DirectoryRow, DirectoryUser, LookupEntry, LookupInput, LookupKind,
        NewAccount, PhoneNumber, Relation,
    },
    repository::Repository,
};

#[derive(Debug, Clone)]
struct StoredAccount {
    account: Account,
    password_hash: String,
}

impl StoredAccount {
    fn credentials(&self) -> AccountCredentials {
        AccountCredentials {
            id: self.account.id,
            usuario: self.account.usuario.clone(),
            nombre: self.account.nombre.clone(),
            email: self.account.email.clone(),
            rol: self.account.rol.clone(),
            estado: self.account.estado.clone(),
            password_hash: self.password_hash.clone(),
        }
    }
}

#[derive(Default)]
struct Tables {
    accounts: Vec<StoredAccount>,
    lookups: HashMap<LookupKind, Vec<LookupEntry>>,
    numbers: Vec<PhoneNumber>,
    users: Vec<DirectoryUser>,
    relations: Vec<Relation>,
}

impl Tables {
    fn duplicate() -> AppError {
        AppError::Conflict("El registro ya existe".to_string())
    }

    fn lookup_table(&mut self, kind: LookupKind) -> &mut Vec<LookupEntry> {
        self.lookups.entry(kind).or_default()
    }

    /// Removes the relations of `numero_id`, then the previously linked users that were left
    /// without any relation.
    fn detach_users(&mut self, numero_id: Uuid) -> usize {
        let candidates: Vec<Uuid> = self
            .relations
            .iter()
            .filter(|r| r.id_numero == numero_id)
            .map(|r| r.id_usuario)
            .collect();
        self.relations.retain(|r| r.id_numero != numero_id);

        let orphans = orphaned_candidates(&candidates, &self.relations);
        self.users.retain(|u| !orphans.contains(&u.id));
        orphans.len()
    }

    fn attach_users(&mut self, numero_id: Uuid, draft: &ContactDraft) -> usize {
        let plan = plan_fan_out(numero_id, &draft.usuarios);
        let created = plan.created();
        self.users.extend(plan.users);
        self.relations.extend(plan.relations);
        created
    }

    fn numero_taken(&self, numero: &str, exclude: Option<Uuid>) -> bool {
        self.numbers
            .iter()
            .any(|n| n.numero == numero && Some(n.id) != exclude)
    }
}

fn number_from_draft(id: Uuid, draft: &ContactDraft) -> PhoneNumber {
    PhoneNumber {
        id,
        numero: draft.numero.clone(),
        tipo: draft.tipo.as_str().to_string(),
        direccion: draft.direccion.clone(),
        unidad: draft.unidad.clone(),
        ubicacion: draft.ubicacion.clone(),
        sigla: draft.sigla.clone(),
    }
}

/// InMemoryRepository
///
/// All tables live behind one mutex, so each call observes and leaves a consistent state,
/// the same guarantee the SQL implementation gets from its transactions.
#[derive(Default)]
pub struct InMemoryRepository {
    tables: Mutex<Tables>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| AppError::Internal("in-memory store poisoned".to_string()))
    }

    /// Seeds an account directly, bypassing validation. Returns the stored account.
    pub fn insert_account(&self, account: Account, password_hash: &str) -> AppResult<Account> {
        let mut tables = self.lock()?;
        tables.accounts.push(StoredAccount {
            account: account.clone(),
            password_hash: password_hash.to_string(),
        });
        Ok(account)
    }

    /// Number of stored directory users and relations, for assertions on the fan-out.
    pub fn directory_counts(&self) -> AppResult<(usize, usize)> {
        let tables = self.lock()?;
        Ok((tables.users.len(), tables.relations.len()))
    }

    /// Relations currently pointing at `numero_id`.
    pub fn relations_of(&self, numero_id: Uuid) -> AppResult<Vec<Relation>> {
        let tables = self.lock()?;
        Ok(tables
            .relations
            .iter()
            .filter(|r| r.id_numero == numero_id)
            .cloned()
            .collect())
    }

    /// Directory users with no relation at all.
    pub fn orphaned_users(&self) -> AppResult<Vec<DirectoryUser>> {
        let tables = self.lock()?;
        Ok(tables
            .users
            .iter()
            .filter(|u| !tables.relations.iter().any(|r| r.id_usuario == u.id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get_account(&self, id: Uuid) -> AppResult<Option<Account>> {
        let tables = self.lock()?;
        Ok(tables
            .accounts
            .iter()
            .find(|s| s.account.id == id)
            .map(|s| s.account.clone()))
    }

    async fn find_credentials(&self, usuario: &str) -> AppResult<Option<AccountCredentials>> {
        let tables = self.lock()?;
        Ok(tables
            .accounts
            .iter()
            .find(|s| s.account.usuario == usuario)
            .map(StoredAccount::credentials))
    }

    async fn get_credentials(&self, id: Uuid) -> AppResult<Option<AccountCredentials>> {
        let tables = self.lock()?;
        Ok(tables
            .accounts
            .iter()
            .find(|s| s.account.id == id)
            .map(StoredAccount::credentials))
    }

    async fn list_accounts(&self) -> AppResult<Vec<AccountListing>> {
        let tables = self.lock()?;
        let name_of = |kind: LookupKind, id: Option<Uuid>| {
            let id = id?;
            tables
                .lookups
                .get(&kind)?
                .iter()
                .find(|e| e.id == id)
                .map(|e| e.nombre.clone())
        };

        let mut listing: Vec<AccountListing> = tables
            .accounts
            .iter()
            .map(|s| {
                let a = &s.account;
                AccountListing {
                    id: a.id,
                    usuario: a.usuario.clone(),
                    nombre: a.nombre.clone(),
                    email: a.email.clone(),
                    rol: a.rol.clone(),
                    estado: a.estado.clone(),
                    rut: a.rut.clone(),
                    id_direccion: a.id_direccion,
                    id_area: a.id_area,
                    nombre_direccion: name_of(LookupKind::Direccion, a.id_direccion),
                    nombre_area: name_of(LookupKind::Unidad, a.id_area),
                }
            })
            .collect();
        listing.sort_by(|a, b| a.nombre.cmp(&b.nombre));
        Ok(listing)
    }

    async fn account_conflict(
        &self,
        usuario: Option<&str>,
        email: &str,
        rut: &str,
        exclude: Option<Uuid>,
    ) -> AppResult<bool> {
        let tables = self.lock()?;
        Ok(tables.accounts.iter().any(|s| {
            let a = &s.account;
            Some(a.id) != exclude
                && (usuario == Some(a.usuario.as_str()) || a.email == email || a.rut == rut)
        }))
    }

    async fn create_account(&self, account: NewAccount) -> AppResult<Account> {
        let mut tables = self.lock()?;
        let clash = tables.accounts.iter().any(|s| {
            s.account.usuario == account.usuario
                || s.account.email == account.email
                || s.account.rut == account.rut
        });
        if clash {
            return Err(Tables::duplicate());
        }

        let created = Account {
            id: Uuid::new_v4(),
            usuario: account.usuario,
            nombre: account.nombre,
            email: account.email,
            rol: account.rol,
            estado: account.estado,
            rut: account.rut,
            id_direccion: account.id_direccion,
            id_area: account.id_area,
        };
        tables.accounts.push(StoredAccount {
            account: created.clone(),
            password_hash: account.password_hash,
        });
        Ok(created)
    }

    async fn update_account(&self, id: Uuid, changes: AccountChanges) -> AppResult<Option<Account>> {
        let mut tables = self.lock()?;
        let clash = tables.accounts.iter().any(|s| {
            s.account.id != id && (s.account.email == changes.email || s.account.rut == changes.rut)
        });
        if clash {
            return Err(Tables::duplicate());
        }

        let Some(stored) = tables.accounts.iter_mut().find(|s| s.account.id == id) else {
            return Ok(None);
        };
        let a = &mut stored.account;
        a.nombre = changes.nombre;
        a.email = changes.email;
        a.rol = changes.rol;
        a.estado = changes.estado;
        a.rut = changes.rut;
        a.id_direccion = changes.id_direccion;
        a.id_area = changes.id_area;
        Ok(Some(a.clone()))
    }

    async fn delete_account(&self, id: Uuid) -> AppResult<bool> {
        let mut tables = self.lock()?;
        let before = tables.accounts.len();
        tables.accounts.retain(|s| s.account.id != id);
        Ok(tables.accounts.len() < before)
    }

    async fn set_password(&self, id: Uuid, password_hash: &str) -> AppResult<bool> {
        let mut tables = self.lock()?;
        match tables.accounts.iter_mut().find(|s| s.account.id == id) {
            Some(stored) => {
                stored.password_hash = password_hash.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // --- LOOKUPS ---

    async fn list_lookup(&self, kind: LookupKind) -> AppResult<Vec<LookupEntry>> {
        let tables = self.lock()?;
        let mut entries = tables.lookups.get(&kind).cloned().unwrap_or_default();
        entries.sort_by(|a, b| a.nombre.cmp(&b.nombre));
        Ok(entries)
    }

    async fn lookup_name_taken(
        &self,
        kind: LookupKind,
        nombre: &str,
        exclude: Option<Uuid>,
    ) -> AppResult<bool> {
        let tables = self.lock()?;
        let needle = nombre.to_lowercase();
        Ok(tables.lookups.get(&kind).is_some_and(|entries| {
            entries
                .iter()
                .any(|e| e.nombre.to_lowercase() == needle && Some(e.id) != exclude)
        }))
    }

    async fn create_lookup(&self, kind: LookupKind, input: LookupInput) -> AppResult<LookupEntry> {
        let mut tables = self.lock()?;
        let table = tables.lookup_table(kind);
        if table.iter().any(|e| e.nombre == input.nombre) {
            return Err(Tables::duplicate());
        }
        let entry = LookupEntry {
            id: Uuid::new_v4(),
            nombre: input.nombre,
            sigla: if kind.has_sigla() { input.sigla } else { None },
        };
        table.push(entry.clone());
        Ok(entry)
    }

    async fn update_lookup(
        &self,
        kind: LookupKind,
        id: Uuid,
        input: LookupInput,
    ) -> AppResult<Option<LookupEntry>> {
        let mut tables = self.lock()?;
        let table = tables.lookup_table(kind);
        if table.iter().any(|e| e.id != id && e.nombre == input.nombre) {
            return Err(Tables::duplicate());
        }
        let Some(entry) = table.iter_mut().find(|e| e.id == id) else {
            return Ok(None);
        };
        entry.nombre = input.nombre;
        if kind.has_sigla() {
            entry.sigla = input.sigla;
        }
        Ok(Some(entry.clone()))
    }

    async fn delete_lookup(&self, kind: LookupKind, id: Uuid) -> AppResult<bool> {
        let mut tables = self.lock()?;
        let table = tables.lookup_table(kind);
        let before = table.len();
        table.retain(|e| e.id != id);
        Ok(table.len() < before)
    }

    // --- CONTACTS ---

    async fn directory_rows(&self) -> AppResult<Vec<DirectoryRow>> {
        let tables = self.lock()?;
        let mut rows = Vec::new();

        for number in &tables.numbers {
            let base = DirectoryRow {
                id: number.id,
                numero: number.numero.clone(),
                tipo: number.tipo.clone(),
                direccion: number.direccion.clone(),
                unidad: number.unidad.clone(),
                ubicacion: number.ubicacion.clone(),
                sigla: number.sigla.clone(),
                nombre: None,
                cargo: None,
            };

            let mut linked: Vec<&DirectoryUser> = tables
                .relations
                .iter()
                .filter(|r| r.id_numero == number.id)
                .filter_map(|r| tables.users.iter().find(|u| u.id == r.id_usuario))
                .collect();
            linked.sort_by(|a, b| a.nombre.cmp(&b.nombre));

            if linked.is_empty() {
                rows.push(base);
                continue;
            }
            for user in linked {
                rows.push(DirectoryRow {
                    nombre: Some(user.nombre.clone()),
                    cargo: Some(user.cargo.clone()),
                    ..base.clone()
                });
            }
        }

        // Stable sort keeps the per-number user order from above.
        rows.sort_by(listing_order);
        Ok(rows)
    }

    async fn get_contact(&self, id: Uuid) -> AppResult<Option<ContactDetail>> {
        let tables = self.lock()?;
        let Some(number) = tables.numbers.iter().find(|n| n.id == id) else {
            return Ok(None);
        };

        let mut usuarios: Vec<DirectoryUser> = tables
            .relations
            .iter()
            .filter(|r| r.id_numero == id)
            .filter_map(|r| tables.users.iter().find(|u| u.id == r.id_usuario))
            .cloned()
            .collect();
        usuarios.sort_by(|a, b| a.nombre.cmp(&b.nombre));

        Ok(Some(ContactDetail::new(number.clone(), usuarios)))
    }

    async fn contact_exists(&self, id: Uuid) -> AppResult<bool> {
        let tables = self.lock()?;
        Ok(tables.numbers.iter().any(|n| n.id == id))
    }

    async fn numero_taken(&self, numero: &str, exclude: Option<Uuid>) -> AppResult<bool> {
        let tables = self.lock()?;
        Ok(tables.numero_taken(numero, exclude))
    }

    async fn create_contact(&self, draft: ContactDraft) -> AppResult<ContactWriteOutcome> {
        let mut tables = self.lock()?;
        if tables.numero_taken(&draft.numero, None) {
            return Err(Tables::duplicate());
        }

        let id = Uuid::new_v4();
        tables.numbers.push(number_from_draft(id, &draft));
        let usuarios_creados = tables.attach_users(id, &draft);

        Ok(ContactWriteOutcome {
            id,
            usuarios_creados,
        })
    }

    async fn update_contact(
        &self,
        id: Uuid,
        draft: ContactDraft,
    ) -> AppResult<Option<ContactWriteOutcome>> {
        let mut tables = self.lock()?;
        if !tables.numbers.iter().any(|n| n.id == id) {
            return Ok(None);
        }
        if tables.numero_taken(&draft.numero, Some(id)) {
            return Err(Tables::duplicate());
        }

        if let Some(number) = tables.numbers.iter_mut().find(|n| n.id == id) {
            *number = number_from_draft(id, &draft);
        }
        tables.detach_users(id);
        let usuarios_creados = tables.attach_users(id, &draft);

        Ok(Some(ContactWriteOutcome {
            id,
            usuarios_creados,
        }))
    }

    async fn delete_contact(&self, id: Uuid) -> AppResult<bool> {
        let mut tables = self.lock()?;
        if !tables.numbers.iter().any(|n| n.id == id) {
            return Ok(false);
        }
        tables.detach_users(id);
        tables.numbers.retain(|n| n.id != id);
        Ok(true)
    }
}
