//! Contact fan-out planning and the public directory listing.
//!
//! Both repositories build their writes from `plan_fan_out` and their reads through
//! `group_listing`, so the storage layers only differ in how rows are persisted.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::models::{
    AdditionalContact, ContactListing, ContactUserInput, DirectoryRow, DirectoryUser, PhoneType,
    Relation,
};

/// Display prefix for mobile numbers (country code plus the mobile 9).
pub const MOBILE_DISPLAY_PREFIX: &str = "+569";

/// FanOut
///
/// Rows to insert for the user list of one contact. Ids are generated here, before any
/// statement runs, so nothing has to be re-selected by name afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FanOut {
    pub users: Vec<DirectoryUser>,
    pub relations: Vec<Relation>,
}

impl FanOut {
    pub fn created(&self) -> usize {
        self.users.len()
    }
}

/// One DirectoryUser and one Relation per entry with a non-blank name.
pub fn plan_fan_out(numero_id: Uuid, entries: &[ContactUserInput]) -> FanOut {
    let mut plan = FanOut::default();

    for entry in entries {
        let nombre = entry.nombre.trim();
        if nombre.is_empty() {
            continue;
        }

        let user = DirectoryUser {
            id: Uuid::new_v4(),
            nombre: nombre.to_string(),
            cargo: entry.cargo.trim().to_string(),
        };
        plan.relations.push(Relation {
            id: Uuid::new_v4(),
            id_usuario: user.id,
            id_numero: numero_id,
        });
        plan.users.push(user);
    }

    plan
}

/// orphaned_candidates
///
/// Given the users that were linked to a contact before its relations were dropped and the
/// relations that still exist, returns the users left with none. The sweep never looks
/// beyond `candidates`.
pub fn orphaned_candidates<'a, I>(candidates: &[Uuid], remaining_relations: I) -> Vec<Uuid>
where
    I: IntoIterator<Item = &'a Relation>,
{
    let still_linked: HashSet<Uuid> = remaining_relations
        .into_iter()
        .map(|r| r.id_usuario)
        .collect();

    let mut seen = HashSet::new();
    candidates
        .iter()
        .copied()
        .filter(|id| seen.insert(*id))
        .filter(|id| !still_linked.contains(id))
        .collect()
}

fn display_numero(numero: &str, tipo: &str) -> String {
    match PhoneType::parse(tipo) {
        Some(PhoneType::Movil) => format!("{}{}", MOBILE_DISPLAY_PREFIX, numero),
        _ => numero.to_string(),
    }
}

/// group_listing
///
/// Folds join rows into one entry per number, keeping the order of first appearance.
/// The first named user fills `nombre`/`cargo`; later users become additional contacts,
/// except repeats of the first user's name.
pub fn group_listing(rows: Vec<DirectoryRow>) -> Vec<ContactListing> {
    let mut listings: Vec<ContactListing> = Vec::new();
    let mut index: HashMap<Uuid, usize> = HashMap::new();

    for row in rows {
        let nombre = row.nombre.unwrap_or_default();
        let cargo = row.cargo.unwrap_or_default();

        match index.get(&row.id) {
            None => {
                let is_fijo = PhoneType::parse(&row.tipo) == Some(PhoneType::Fijo);
                index.insert(row.id, listings.len());
                listings.push(ContactListing {
                    id: row.id,
                    anexo: if is_fijo { row.numero.clone() } else { String::new() },
                    numero: display_numero(&row.numero, &row.tipo),
                    tipo: row.tipo,
                    nombre,
                    direccion: row.direccion,
                    unidad: row.unidad,
                    cargo,
                    ubicacion: row.ubicacion,
                    sigla: row.sigla.unwrap_or_default(),
                    additional_contacts: Vec::new(),
                });
            }
            Some(&pos) => {
                let listing = &mut listings[pos];
                // Users named like the first one are skipped, whatever their cargo.
                if nombre.is_empty() || nombre == listing.nombre {
                    continue;
                }
                listing.additional_contacts.push(AdditionalContact {
                    nombre,
                    unidad: row.unidad,
                    cargo,
                    direccion: row.direccion,
                    ubicacion: row.ubicacion,
                });
            }
        }
    }

    listings
}

/// Lower-cases and strips Spanish diacritics so "Dirección" matches "direccion".
pub fn fold_for_search(text: &str) -> String {
    text.chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            other => other,
        })
        .collect()
}

/// matches_search
///
/// True when the folded term is a substring of any text field of the entry or of its
/// additional contacts. A blank term matches everything.
pub fn matches_search(listing: &ContactListing, term: &str) -> bool {
    let needle = fold_for_search(term.trim());
    if needle.is_empty() {
        return true;
    }

    let hit = |field: &str| fold_for_search(field).contains(&needle);

    let own = [
        &listing.nombre,
        &listing.anexo,
        &listing.numero,
        &listing.tipo,
        &listing.direccion,
        &listing.unidad,
        &listing.cargo,
        &listing.ubicacion,
        &listing.sigla,
    ];
    if own.into_iter().any(|f| hit(f.as_str())) {
        return true;
    }

    listing.additional_contacts.iter().any(|c| {
        [&c.nombre, &c.unidad, &c.cargo, &c.direccion, &c.ubicacion]
            .into_iter()
            .any(|f| hit(f.as_str()))
    })
}

/// Sort key matching the SQL listing order: tipo, then numero.
pub fn listing_order(a: &DirectoryRow, b: &DirectoryRow) -> std::cmp::Ordering {
    a.tipo
        .cmp(&b.tipo)
        .then_with(|| a.numero.cmp(&b.numero))
        .then_with(|| a.id.cmp(&b.id))
}
