//! Roster acquisition.

use rollcall_store::{DocStore, Filter};
use tracing::warn;

use crate::error::SessionError;
use crate::keys;
use crate::types::Student;

/// Loads the roster for a class, in enrollment order.
///
/// A store failure is fatal (the caller must not start a session);
/// individual documents that do not decode as students are logged and
/// skipped so one corrupt profile cannot block a whole class.
pub fn load_roster(store: &dyn DocStore, class_name: &str) -> Result<Vec<Student>, SessionError> {
    let docs = store.find(keys::STUDENTS, &Filter::new().eq("class_name", class_name))?;

    let mut roster = Vec::with_capacity(docs.len());
    for doc in docs {
        match serde_json::from_value::<Student>(doc.value) {
            Ok(student) => roster.push(student),
            Err(e) => warn!(key = %doc.key, "skipping malformed student document: {e}"),
        }
    }
    Ok(roster)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_store::MemoryStore;
    use serde_json::json;

    #[test]
    fn returns_only_the_requested_class_in_order() {
        let store = MemoryStore::new();
        store
            .insert(keys::STUDENTS, json!({"student_id": "s1", "name": "Alice", "class_name": "CS101"}))
            .unwrap();
        store
            .insert(keys::STUDENTS, json!({"student_id": "x9", "name": "Zoe", "class_name": "CS999"}))
            .unwrap();
        store
            .insert(keys::STUDENTS, json!({"student_id": "s2", "name": "Bob", "class_name": "CS101"}))
            .unwrap();

        let roster = load_roster(&store, "CS101").unwrap();
        let ids: Vec<&str> = roster.iter().map(|s| s.student_id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "s2"]);
    }

    #[test]
    fn malformed_documents_are_skipped() {
        let store = MemoryStore::new();
        store
            .insert(keys::STUDENTS, json!({"class_name": "CS101", "broken": true}))
            .unwrap();
        store
            .insert(keys::STUDENTS, json!({"student_id": "s1", "name": "Alice", "class_name": "CS101"}))
            .unwrap();

        let roster = load_roster(&store, "CS101").unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].student_id, "s1");
    }

    #[test]
    fn unknown_class_is_empty_not_an_error() {
        let store = MemoryStore::new();
        assert!(load_roster(&store, "CS101").unwrap().is_empty());
    }
}
