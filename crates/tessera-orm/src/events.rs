//! Change notifications for models flagged `notify`.

use std::fmt;

use serde_json::{json, Map, Value as Json};
use tessera_types::Instance;

use crate::engine::Engine;
use crate::error::OrmResult;
use crate::schema::ModelSchema;

/// Kind of write a notification reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChangeEvent {
    Create,
    Update,
    Delete,
}

impl ChangeEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Engine {
    /// Flat JSON projection of `instance`: type, id and public attributes.
    pub fn to_json(&self, instance: &Instance) -> OrmResult<Json> {
        let schema = self.schema(instance.model())?;
        Ok(project(schema, instance))
    }

    /// Publish `event` to the namespace channel and the instance channel.
    ///
    /// Delivery is fire-and-forget: publish failures are logged, never
    /// returned.
    pub(crate) fn notify(&self, schema: &ModelSchema, event: ChangeEvent, instance: &Instance) {
        if !self.config().notify || !schema.notifies() {
            return;
        }
        let payload = json!({
            "event": event.as_str(),
            "data": project(schema, instance),
        })
        .to_string();

        let ns = schema.namespace();
        for channel in [ns.as_str().to_string(), ns.obj(instance.id())] {
            match self.store().publish(&channel, &payload) {
                Ok(receivers) => {
                    tracing::debug!(%channel, %event, id = %instance.id(), receivers, "published")
                }
                Err(e) => {
                    tracing::warn!(%channel, %event, id = %instance.id(), error = %e, "publish failed")
                }
            }
        }
    }
}

fn project(schema: &ModelSchema, instance: &Instance) -> Json {
    let mut attributes = Map::new();
    for field in schema.fields().iter().filter(|f| !f.is_private()) {
        attributes.insert(
            field.name().to_string(),
            field.to_presentation(instance.get(field.name())),
        );
    }
    json!({
        "type": schema.namespace().as_str(),
        "id": instance.id().as_str(),
        "attributes": attributes,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tessera_store::Message;

    use super::*;
    use crate::testing::{raw, zoo};

    fn payload(message: Message) -> Json {
        serde_json::from_str(&message.payload).unwrap()
    }

    #[test]
    fn projection_hides_private_fields() {
        let engine = zoo();
        let ann = engine
            .create(
                "Person",
                &raw(json!({"name": "Ann", "email": "a@z.org", "password": "pw"})),
            )
            .unwrap();
        let projected = engine.to_json(&ann).unwrap();

        assert_eq!(projected["type"], json!("person"));
        assert_eq!(projected["id"], json!(ann.id().as_str()));
        assert_eq!(projected["attributes"]["name"], json!("Ann"));
        assert_eq!(projected["attributes"]["prefs"], json!({}));
        assert_eq!(projected["attributes"]["home"], Json::Null);
        assert!(projected["attributes"].get("password").is_none());
    }

    #[test]
    fn notify_models_publish_writes() {
        let engine = zoo();
        let mut all = engine.subscribe("Person").unwrap();

        let mut ann = engine
            .create("Person", &raw(json!({"name": "Ann", "email": "a@z.org"})))
            .unwrap();
        let mut own = engine.subscribe_instance(&ann).unwrap();
        engine.update(&mut ann, &raw(json!({"name": "Anne"}))).unwrap();
        engine.delete(&ann).unwrap();

        let events: Vec<Json> = std::iter::from_fn(|| all.try_recv()).map(payload).collect();
        let kinds: Vec<&str> = events.iter().filter_map(|e| e["event"].as_str()).collect();
        assert_eq!(kinds, vec!["create", "update", "delete"]);
        assert_eq!(events[1]["data"]["attributes"]["name"], json!("Anne"));

        let own = payload(own.try_recv().unwrap());
        assert_eq!(own["event"], json!("update"));
        assert_eq!(own["data"]["id"], json!(ann.id().as_str()));
    }

    #[test]
    fn quiet_models_publish_nothing() {
        let engine = zoo();
        let mut pets = engine.subscribe("Pet").unwrap();
        engine.create("Pet", &raw(json!({"name": "Rex"}))).unwrap();
        assert!(pets.try_recv().is_none());
    }

    #[test]
    fn global_switch_silences_events() {
        let engine = crate::testing::zoo_with(crate::EngineConfig {
            notify: false,
            ..Default::default()
        });
        let mut all = engine.subscribe("Person").unwrap();
        engine
            .create("Person", &raw(json!({"name": "Ann", "email": "a@z.org"})))
            .unwrap();
        assert!(all.try_recv().is_none());
    }
}
