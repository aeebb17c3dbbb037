//! DynamoDB table backend.
//!
//! Sessions live in one table with a composite primary key: the partition
//! attribute holds a fixed partition name and the sort attribute holds the
//! session identifier. Every session key is stored as its own string
//! attribute (`s_<key>`) containing the JSON encoded value, so an update is a
//! single `UpdateItem` that upserts only the changed keys.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use std::collections::HashMap;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::error::{configuration, dynamodb_error, not_found, serde_error, SessionResult};
use crate::model::{SessionId, SessionMap};
use crate::store::SessionStore;

const STATE_PREFIX: &str = "s_";
const UPDATED_AT_ATTR: &str = "updated_at";
const TTL_ATTR: &str = "ttl";

/// Configuration for the DynamoDB session store.
#[derive(Clone, Debug)]
pub struct DynamoDbConfig {
    pub table_name: String,
    /// AWS region; `None` uses the default provider chain.
    pub region: Option<String>,
    /// Value of the partition attribute shared by all session items.
    pub partition: String,
    pub partition_key: String,
    pub sort_key: String,
    /// Written as an epoch-seconds `ttl` attribute for DynamoDB TTL expiry.
    pub ttl: Option<Duration>,
}

impl Default for DynamoDbConfig {
    fn default() -> Self {
        Self {
            table_name: "sessions".to_string(),
            region: None,
            partition: "session".to_string(),
            partition_key: "pk".to_string(),
            sort_key: "sk".to_string(),
            ttl: None,
        }
    }
}

pub struct DynamoDbSessionStore {
    client: Client,
    config: DynamoDbConfig,
}

impl DynamoDbSessionStore {
    /// Loads AWS configuration from the environment and verifies the table.
    pub async fn connect(config: DynamoDbConfig) -> SessionResult<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let sdk_config = loader.load().await;
        let store = Self::from_client(Client::new(&sdk_config), config);
        store.verify_table().await?;
        Ok(store)
    }

    /// Wraps an existing client without contacting the service.
    pub fn from_client(client: Client, config: DynamoDbConfig) -> Self {
        Self { client, config }
    }

    async fn verify_table(&self) -> SessionResult<()> {
        self.client
            .describe_table()
            .table_name(&self.config.table_name)
            .send()
            .await
            .map_err(|err| {
                configuration(format!(
                    "dynamodb table `{}` unavailable: {}",
                    self.config.table_name,
                    aws_sdk_dynamodb::error::DisplayErrorContext(&err)
                ))
            })?;
        info!(table = %self.config.table_name, "verified dynamodb session table");
        Ok(())
    }

    fn item_key(&self, id: &SessionId) -> HashMap<String, AttributeValue> {
        HashMap::from([
            (
                self.config.partition_key.clone(),
                AttributeValue::S(self.config.partition.clone()),
            ),
            (
                self.config.sort_key.clone(),
                AttributeValue::S(id.as_str().to_owned()),
            ),
        ])
    }
}

/// Pulls the session state out of an item, ignoring key and bookkeeping attributes.
fn state_from_item(item: HashMap<String, AttributeValue>) -> SessionResult<SessionMap> {
    let mut state = SessionMap::new();
    for (name, value) in item {
        let Some(key) = name.strip_prefix(STATE_PREFIX) else {
            continue;
        };
        let Ok(payload) = value.as_s() else {
            continue;
        };
        state.insert(key.to_owned(), serde_json::from_str(payload).map_err(serde_error)?);
    }
    Ok(state)
}

struct UpdatePlan {
    expression: String,
    names: HashMap<String, String>,
    values: HashMap<String, AttributeValue>,
}

fn update_plan(changes: &SessionMap, now: i64, ttl: Option<Duration>) -> SessionResult<UpdatePlan> {
    let mut keys: Vec<&String> = changes.keys().collect();
    keys.sort();

    let mut assignments = vec!["#updated_at = :updated_at".to_string()];
    let mut names = HashMap::from([("#updated_at".to_string(), UPDATED_AT_ATTR.to_string())]);
    let mut values = HashMap::from([(":updated_at".to_string(), AttributeValue::N(now.to_string()))]);

    if let Some(ttl) = ttl {
        let expires = now.saturating_add(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX));
        assignments.push("#ttl = :ttl".to_string());
        names.insert("#ttl".to_string(), TTL_ATTR.to_string());
        values.insert(":ttl".to_string(), AttributeValue::N(expires.to_string()));
    }

    for (index, key) in keys.into_iter().enumerate() {
        let payload = serde_json::to_string(&changes[key]).map_err(serde_error)?;
        assignments.push(format!("#k{index} = :v{index}"));
        names.insert(format!("#k{index}"), format!("{STATE_PREFIX}{key}"));
        values.insert(format!(":v{index}"), AttributeValue::S(payload));
    }

    Ok(UpdatePlan {
        expression: format!("SET {}", assignments.join(", ")),
        names,
        values,
    })
}

#[async_trait]
impl SessionStore for DynamoDbSessionStore {
    fn backend_name(&self) -> &'static str {
        "dynamodb"
    }

    async fn load(&self, id: &SessionId) -> SessionResult<SessionMap> {
        let output = self
            .client
            .get_item()
            .table_name(&self.config.table_name)
            .set_key(Some(self.item_key(id)))
            .consistent_read(true)
            .send()
            .await
            .map_err(dynamodb_error)?;
        match output.item {
            Some(item) => state_from_item(item),
            None => Err(not_found(id)),
        }
    }

    async fn update(&self, id: &SessionId, changes: &SessionMap) -> SessionResult<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let plan = update_plan(changes, now, self.config.ttl)?;
        self.client
            .update_item()
            .table_name(&self.config.table_name)
            .set_key(Some(self.item_key(id)))
            .update_expression(plan.expression)
            .set_expression_attribute_names(Some(plan.names))
            .set_expression_attribute_values(Some(plan.values))
            .send()
            .await
            .map_err(dynamodb_error)?;
        debug!(session = %id.fingerprint(), keys = changes.len(), "dynamodb session updated");
        Ok(())
    }

    async fn reset(&self, id: &SessionId) -> SessionResult<()> {
        self.client
            .delete_item()
            .table_name(&self.config.table_name)
            .set_key(Some(self.item_key(id)))
            .send()
            .await
            .map_err(dynamodb_error)?;
        Ok(())
    }
}
