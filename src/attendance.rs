//! Attendance recorder.
//! Resolves (or lazily creates) the Contact for a net id, then adds it to the
//! Event's `Attendees` link field with set semantics.
//!
//! Every step is awaited in sequence. The attendee update is a full
//! read-modify-write of the field: two instances recording the same event at
//! once can overwrite each other's additions. Contact creation is never
//! retried, since a lost response would otherwise produce a duplicate.

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::store::{Fields, Query, RecordStore};

pub const CONTACTS_TABLE: &str = "Contacts";
pub const EVENTS_TABLE: &str = "Events";
pub const NET_ID_FIELD: &str = "Net ID";
pub const EMAIL_FIELD: &str = "Preferred Email Address";
pub const ATTENDEES_FIELD: &str = "Attendees";

pub struct Recorder<S> {
    store: S,
    institution_domain: String,
    contacts_view: String,
}

impl<S: RecordStore> Recorder<S> {
    pub fn new(store: S, institution_domain: &str, contacts_view: &str) -> Self {
        Self {
            store,
            institution_domain: institution_domain.to_string(),
            contacts_view: contacts_view.to_string(),
        }
    }

    #[cfg(test)]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Makes sure `net_id`'s contact is on the event's attendee list.
    pub async fn record_attendance(&self, event_id: &str, net_id: &str) -> Result<()> {
        let contact_id = self.get_or_create_contact_id(net_id).await?;
        self.mark_contact_attended(event_id, &contact_id).await
    }

    /// Looks up the contact id for `net_id`, or `None` if there is no such contact.
    pub async fn find_contact_id(&self, net_id: &str) -> Result<Option<String>> {
        let query = Query {
            filter_formula: net_id_formula(net_id),
            view: self.contacts_view.clone(),
        };
        let record = self
            .store
            .select_first(CONTACTS_TABLE, &query)
            .await
            .with_context(|| format!("Failed to look up contact for {net_id}"))?;
        Ok(record.map(|r| r.id))
    }

    /// Creates a contact record for `net_id` and returns its id.
    pub async fn create_contact(&self, net_id: &str) -> Result<String> {
        let mut fields = Fields::new();
        fields.insert(
            EMAIL_FIELD.to_string(),
            json!(format!("{net_id}@{}", self.institution_domain)),
        );
        fields.insert(NET_ID_FIELD.to_string(), json!(net_id));

        let record = self
            .store
            .create(CONTACTS_TABLE, fields)
            .await
            .with_context(|| format!("Failed to create contact for {net_id}"))?;
        info!(table = CONTACTS_TABLE, net_id, contact_id = %record.id, "created contact");
        Ok(record.id)
    }

    pub async fn get_or_create_contact_id(&self, net_id: &str) -> Result<String> {
        if let Some(contact_id) = self.find_contact_id(net_id).await? {
            debug!(table = CONTACTS_TABLE, net_id, contact_id = %contact_id, "found existing contact");
            return Ok(contact_id);
        }
        self.create_contact(net_id).await
    }

    pub async fn event_attendees(&self, event_id: &str) -> Result<Vec<String>> {
        let event = self
            .store
            .find(EVENTS_TABLE, event_id)
            .await
            .with_context(|| format!("Failed to fetch event {event_id}"))?;
        event
            .linked_ids(ATTENDEES_FIELD)
            .with_context(|| format!("Failed to read attendees of event {event_id}"))
    }

    /// Adds `contact_id` to the event's attendees. Writes nothing when it is
    /// already there and the list has no duplicates.
    pub async fn mark_contact_attended(&self, event_id: &str, contact_id: &str) -> Result<()> {
        let current = self.event_attendees(event_id).await?;
        let attendees = union_attendees(&current, contact_id);
        if attendees == current {
            debug!(table = EVENTS_TABLE, event_id, contact_id, "contact already recorded as attendee");
            return Ok(());
        }

        let mut fields = Fields::new();
        fields.insert(
            ATTENDEES_FIELD.to_string(),
            Value::Array(attendees.into_iter().map(Value::String).collect()),
        );
        self.store
            .update(EVENTS_TABLE, event_id, fields)
            .await
            .with_context(|| format!("Failed to update attendees of event {event_id}"))?;
        info!(table = EVENTS_TABLE, event_id, contact_id, "recorded attendance");
        Ok(())
    }
}

/// Existing attendees plus `contact_id`, duplicates removed, first occurrence kept.
fn union_attendees(current: &[String], contact_id: &str) -> Vec<String> {
    let mut attendees: Vec<String> = Vec::with_capacity(current.len() + 1);
    for id in current.iter().map(String::as_str).chain([contact_id]) {
        if !attendees.iter().any(|existing| existing == id) {
            attendees.push(id.to_string());
        }
    }
    attendees
}

/// `({Net ID} = '<net_id>')`, with the value escaped as an Airtable string literal.
fn net_id_formula(net_id: &str) -> String {
    let escaped = net_id.replace('\\', "\\\\").replace('\'', "\\'");
    format!("({{{NET_ID_FIELD}}} = '{escaped}')")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::store::StoreError;

    const EVENT: &str = "E1";

    fn recorder_with_event(attendees: &[&str]) -> Recorder<MemoryStore> {
        let store = MemoryStore::new();
        let mut fields = Fields::new();
        if !attendees.is_empty() {
            fields.insert(ATTENDEES_FIELD.to_string(), json!(attendees));
        }
        store.insert(EVENTS_TABLE, EVENT, fields);
        Recorder::new(store, "msstate.edu", "Main View")
    }

    fn add_contact(recorder: &Recorder<MemoryStore>, id: &str, net_id: &str) {
        let mut fields = Fields::new();
        fields.insert(NET_ID_FIELD.to_string(), json!(net_id));
        recorder.store().insert(CONTACTS_TABLE, id, fields);
    }

    fn attendees(recorder: &Recorder<MemoryStore>) -> Vec<String> {
        recorder
            .store()
            .records(EVENTS_TABLE)
            .into_iter()
            .find(|r| r.id == EVENT)
            .unwrap()
            .linked_ids(ATTENDEES_FIELD)
            .unwrap()
    }

    #[test]
    fn test_net_id_formula() {
        assert_eq!(net_id_formula("jdoe"), "({Net ID} = 'jdoe')");
        assert_eq!(net_id_formula("o'neil"), r"({Net ID} = 'o\'neil')");
        assert_eq!(net_id_formula(r"a\b"), r"({Net ID} = 'a\\b')");
    }

    #[test]
    fn test_union_attendees() {
        let current = vec!["recA".to_string(), "recB".to_string()];
        assert_eq!(union_attendees(&current, "recC"), vec!["recA", "recB", "recC"]);
        assert_eq!(union_attendees(&current, "recA"), vec!["recA", "recB"]);
        assert_eq!(union_attendees(&[], "recA"), vec!["recA"]);

        let duplicated = vec!["recA".to_string(), "recA".to_string()];
        assert_eq!(union_attendees(&duplicated, "recB"), vec!["recA", "recB"]);
    }

    #[tokio::test]
    async fn test_new_net_id_creates_one_contact() {
        let recorder = recorder_with_event(&[]);
        recorder.record_attendance(EVENT, "jdoe").await.unwrap();

        let contacts = recorder.store().records(CONTACTS_TABLE);
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].fields[NET_ID_FIELD], "jdoe");
        assert_eq!(contacts[0].fields[EMAIL_FIELD], "jdoe@msstate.edu");
        assert_eq!(attendees(&recorder), vec![contacts[0].id.clone()]);
    }

    #[tokio::test]
    async fn test_existing_contact_is_reused() {
        let recorder = recorder_with_event(&["recOTHER"]);
        add_contact(&recorder, "recJDOE", "jdoe");

        recorder.record_attendance(EVENT, "jdoe").await.unwrap();

        assert_eq!(recorder.store().creates(), 0);
        assert_eq!(attendees(&recorder), vec!["recOTHER", "recJDOE"]);
    }

    #[tokio::test]
    async fn test_already_recorded_attendee_is_a_no_op() {
        let recorder = recorder_with_event(&["recJDOE"]);
        add_contact(&recorder, "recJDOE", "jdoe");

        recorder.record_attendance(EVENT, "jdoe").await.unwrap();

        assert_eq!(recorder.store().creates(), 0);
        assert_eq!(recorder.store().updates(), 0);
        assert_eq!(attendees(&recorder), vec!["recJDOE"]);
    }

    #[tokio::test]
    async fn test_recording_twice_keeps_single_contact_and_reference() {
        let recorder = recorder_with_event(&[]);
        recorder.record_attendance(EVENT, "jdoe").await.unwrap();
        recorder.record_attendance(EVENT, "jdoe").await.unwrap();

        let contacts = recorder.store().records(CONTACTS_TABLE);
        assert_eq!(contacts.len(), 1);
        assert_eq!(recorder.store().creates(), 1);
        assert_eq!(attendees(&recorder), vec![contacts[0].id.clone()]);
    }

    #[tokio::test]
    async fn test_lookup_uses_view_and_single_match_formula() {
        let recorder = recorder_with_event(&[]);
        recorder.find_contact_id("jdoe").await.unwrap();

        let queries = recorder.store().queries.lock().unwrap().clone();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].0, CONTACTS_TABLE);
        assert_eq!(queries[0].1.view, "Main View");
        assert_eq!(queries[0].1.filter_formula, "({Net ID} = 'jdoe')");
    }

    #[tokio::test]
    async fn test_missing_event_fails_but_keeps_contact() {
        let recorder = Recorder::new(MemoryStore::new(), "msstate.edu", "Main View");

        let err = recorder.record_attendance("recMISSING", "jdoe").await.unwrap_err();

        assert!(err.to_string().contains("recMISSING"));
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::NotFound { .. })
        ));
        // No rollback: the contact created before the failing step stays
        assert_eq!(recorder.store().records(CONTACTS_TABLE).len(), 1);
    }

    #[tokio::test]
    async fn test_store_failure_surfaces() {
        let recorder = recorder_with_event(&[]);
        *recorder.store().fail_with.lock().unwrap() = Some(401);

        let err = recorder.record_attendance(EVENT, "jdoe").await.unwrap_err();

        assert!(format!("{err:#}").contains("401"));
        assert_eq!(recorder.store().creates(), 0);
    }

    #[tokio::test]
    async fn test_malformed_attendee_list_is_not_overwritten() {
        let store = MemoryStore::new();
        let mut fields = Fields::new();
        fields.insert(ATTENDEES_FIELD.to_string(), json!(["recA", 42]));
        store.insert(EVENTS_TABLE, EVENT, fields);
        let recorder = Recorder::new(store, "msstate.edu", "Main View");

        let err = recorder.record_attendance(EVENT, "jdoe").await.unwrap_err();

        assert!(format!("{err:#}").contains("Failed to read attendees of event E1"));
        assert_eq!(recorder.store().updates(), 0);
        let event = recorder.store().records(EVENTS_TABLE).remove(0);
        assert_eq!(event.fields[ATTENDEES_FIELD], json!(["recA", 42]));
    }

    /// Collects `(message, table)` pairs from events emitted while installed.
    #[derive(Clone, Default)]
    struct TableFields(std::sync::Arc<std::sync::Mutex<Vec<(String, String)>>>);

    #[derive(Default)]
    struct FieldVisitor {
        message: String,
        table: String,
    }

    impl tracing::field::Visit for FieldVisitor {
        fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
            if field.name() == "table" {
                self.table = value.to_string();
            }
        }

        fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
            match field.name() {
                "message" => self.message = format!("{value:?}"),
                "table" => self.table = format!("{value:?}"),
                _ => {}
            }
        }
    }

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for TableFields {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            let mut visitor = FieldVisitor::default();
            event.record(&mut visitor);
            self.0.lock().unwrap().push((visitor.message, visitor.table));
        }
    }

    #[tokio::test]
    async fn test_events_carry_table_field() {
        use tracing_subscriber::layer::SubscriberExt;

        let captured = TableFields::default();
        let subscriber = tracing_subscriber::registry().with(captured.clone());
        let _guard = tracing::subscriber::set_default(subscriber);

        let recorder = recorder_with_event(&[]);
        recorder.record_attendance(EVENT, "jdoe").await.unwrap();
        recorder.record_attendance(EVENT, "jdoe").await.unwrap();

        let events = captured.0.lock().unwrap().clone();
        let table_of = |message: &str| {
            events
                .iter()
                .find(|(m, _)| m == message)
                .map(|(_, t)| t.clone())
        };
        assert_eq!(table_of("created contact").as_deref(), Some(CONTACTS_TABLE));
        assert_eq!(table_of("found existing contact").as_deref(), Some(CONTACTS_TABLE));
        assert_eq!(table_of("recorded attendance").as_deref(), Some(EVENTS_TABLE));
        assert_eq!(
            table_of("contact already recorded as attendee").as_deref(),
            Some(EVENTS_TABLE)
        );
    }
}
