//! Property template negotiation
//!
//! Dropbox stores structured metadata in *property groups*, each bound to a
//! user-owned *property template* that declares the allowed field names.
//! Before metadata with a given set of keys is written, the template must
//! declare all of them.
//!
//! ## Algorithm
//!
//! 1. Nothing cached: list the user's templates. Reuse the first one if any,
//!    otherwise create one whose fields are exactly the requested keys.
//! 2. Template cached: add only the keys it is missing, then re-fetch it.
//!
//! Readers that only need the template id use
//! [`SchemaManager::template_id`], which never extends an existing template.
//!
//! Fields are only ever added. Negotiation is single-flight: concurrent
//! callers queue on the cache lock, so two callers never both create a
//! template or both extend it with the same field.

use std::collections::{BTreeSet, HashSet};

use harmony_core::domain::{MetadataKey, ServiceError};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::client::DropboxClient;
use crate::translate::process;

// ============================================================================
// Wire types
// ============================================================================

/// Declared field of a property template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyFieldTemplate {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub field_type: PropertyType,
}

impl PropertyFieldTemplate {
    fn for_key(key: MetadataKey) -> Self {
        Self {
            name: key.as_str().to_string(),
            description: key.as_str().to_string(),
            field_type: PropertyType::String,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = ".tag", rename_all = "snake_case")]
pub enum PropertyType {
    String,
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ListTemplatesResult {
    template_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
struct AddTemplateArg<'a> {
    name: &'a str,
    description: &'a str,
    fields: Vec<PropertyFieldTemplate>,
}

#[derive(Debug, Serialize)]
struct UpdateTemplateArg<'a> {
    template_id: &'a str,
    add_fields: Vec<PropertyFieldTemplate>,
}

#[derive(Debug, Serialize)]
struct TemplateIdArg<'a> {
    template_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct TemplateIdResult {
    template_id: String,
}

#[derive(Debug, Deserialize)]
struct GetTemplateResult {
    name: String,
    #[serde(default)]
    description: String,
    fields: Vec<PropertyFieldTemplate>,
}

// ============================================================================
// PropertyTemplate
// ============================================================================

/// A fetched property template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyTemplate {
    pub id: String,
    pub name: String,
    pub description: String,
    pub fields: Vec<PropertyFieldTemplate>,
}

impl PropertyTemplate {
    pub fn field_names(&self) -> HashSet<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn declares(&self, key: MetadataKey) -> bool {
        self.fields.iter().any(|f| f.name == key.as_str())
    }
}

// ============================================================================
// SchemaManager
// ============================================================================

/// Ensures the user's property template declares the metadata keys in use
pub struct SchemaManager {
    template_name: String,
    template_description: String,
    cache: Mutex<Option<PropertyTemplate>>,
}

impl SchemaManager {
    /// Creates a manager that names new templates `template_name`
    pub fn new(template_name: impl Into<String>, template_description: impl Into<String>) -> Self {
        Self {
            template_name: template_name.into(),
            template_description: template_description.into(),
            cache: Mutex::new(None),
        }
    }

    /// Makes sure the template declares every key in `keys`
    ///
    /// Returns the template id. Once the cached template covers `keys`, no
    /// network call is made.
    pub async fn ensure(
        &self,
        client: &DropboxClient,
        keys: impl IntoIterator<Item = MetadataKey>,
    ) -> Result<String, ServiceError> {
        let requested: BTreeSet<MetadataKey> = keys.into_iter().collect();
        let mut cache = self.cache.lock().await;

        if cache.is_none() {
            *cache = Some(self.load_or_create(client, &requested).await?);
        }

        let Some(template) = cache.as_ref() else {
            return Err(ServiceError::InvalidResponse);
        };

        let missing: Vec<MetadataKey> = requested
            .iter()
            .copied()
            .filter(|key| !template.declares(*key))
            .collect();
        if missing.is_empty() {
            return Ok(template.id.clone());
        }

        debug!(
            template_id = %template.id,
            missing = missing.len(),
            "Extending property template"
        );
        let arg = UpdateTemplateArg {
            template_id: &template.id,
            add_fields: missing.into_iter().map(PropertyFieldTemplate::for_key).collect(),
        };
        let updated: TemplateIdResult =
            process(client.rpc("file_properties/templates/update_for_user", &arg).await)?;
        let template = fetch_template(client, &updated.template_id).await?;
        info!(
            template_id = %template.id,
            fields = template.fields.len(),
            "Updated property template"
        );

        let template_id = template.id.clone();
        *cache = Some(template);
        Ok(template_id)
    }

    /// The id of the user's template, without extending it
    ///
    /// Reading metadata never needs new fields, so an existing template is
    /// reused as-is. A template is only created when the user has none.
    pub async fn template_id(&self, client: &DropboxClient) -> Result<String, ServiceError> {
        let mut cache = self.cache.lock().await;
        if let Some(template) = cache.as_ref() {
            return Ok(template.id.clone());
        }

        let template = self
            .load_or_create(client, &MetadataKey::ALL.into_iter().collect())
            .await?;
        let template_id = template.id.clone();
        *cache = Some(template);
        Ok(template_id)
    }

    async fn load_or_create(
        &self,
        client: &DropboxClient,
        initial_keys: &BTreeSet<MetadataKey>,
    ) -> Result<PropertyTemplate, ServiceError> {
        let listed: ListTemplatesResult =
            process(client.rpc("file_properties/templates/list_for_user", &()).await)?;

        if let Some(template_id) = listed.template_ids.first() {
            debug!(template_id = %template_id, "Reusing existing property template");
            return fetch_template(client, template_id).await;
        }

        let arg = AddTemplateArg {
            name: &self.template_name,
            description: &self.template_description,
            fields: initial_keys
                .iter()
                .copied()
                .map(PropertyFieldTemplate::for_key)
                .collect(),
        };
        let added: TemplateIdResult =
            process(client.rpc("file_properties/templates/add_for_user", &arg).await)?;
        let template = fetch_template(client, &added.template_id).await?;
        info!(
            template_id = %template.id,
            fields = template.fields.len(),
            "Created property template"
        );
        Ok(template)
    }

    /// The cached template, if negotiation has happened
    pub async fn cached(&self) -> Option<PropertyTemplate> {
        self.cache.lock().await.clone()
    }

    /// Forgets the cached template, e.g. after signing out
    pub async fn invalidate(&self) {
        *self.cache.lock().await = None;
    }
}

async fn fetch_template(
    client: &DropboxClient,
    template_id: &str,
) -> Result<PropertyTemplate, ServiceError> {
    let fetched: GetTemplateResult = process(
        client
            .rpc(
                "file_properties/templates/get_for_user",
                &TemplateIdArg { template_id },
            )
            .await,
    )?;

    Ok(PropertyTemplate {
        id: template_id.to_string(),
        name: fetched.name,
        description: fetched.description,
        fields: fetched.fields,
    })
}
