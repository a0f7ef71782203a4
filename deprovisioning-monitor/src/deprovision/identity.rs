/*!
Identity management API: wire types, the client trait and the Unity REST admin client
*/

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::trace;
use url::Url;

use crate::deprovision::config::ApiConfig;
use crate::deprovision::error::{MonitorError, Result};

/// Opaque entity identifier assigned by the identity system
pub type EntityId = u64;

pub const PERSISTENT_IDENTITY_TYPE: &str = "persistent";

/// Members of the monitored group
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GroupContents {
    #[serde(default)]
    pub members: Vec<EntityId>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub entity_information: EntityInformation,
    #[serde(default)]
    pub identities: Vec<Identity>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityInformation {
    pub state: EntityState,
    #[serde(default)]
    pub scheduled_operation: Option<EntityOperation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityState {
    Valid,
    AuthenticationDisabled,
    Disabled,
    OnlyLoginPermitted,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityOperation {
    Remove,
    Disable,
    RemoveLastIdentity,
    #[serde(other)]
    Other,
}

impl EntityOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityOperation::Remove => "REMOVE",
            EntityOperation::Disable => "DISABLE",
            EntityOperation::RemoveLastIdentity => "REMOVE_LAST_IDENTITY",
            EntityOperation::Other => "OTHER",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub type_id: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Attribute {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub visibility: Option<AttributeVisibility>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeVisibility {
    Full,
    Local,
    #[serde(other)]
    Unknown,
}

impl Attribute {
    pub fn is_fully_visible(&self) -> bool {
        self.visibility == Some(AttributeVisibility::Full)
    }
}

/// Operations the monitor needs from the identity system
#[async_trait]
pub trait IdentityApi: Send + Sync {
    /// Membership of the configured group
    async fn get_group(&self) -> Result<GroupContents>;

    async fn get_entity(&self, id: EntityId) -> Result<Entity>;

    async fn get_entity_attrs(&self, id: EntityId, effective: bool) -> Result<Vec<Attribute>>;

    async fn remove_entity_attr(&self, id: EntityId, name: &str) -> Result<()>;

    /// Register a future operation; the identity system carries it out at `when`
    async fn schedule_operation(
        &self,
        id: EntityId,
        operation: EntityOperation,
        when: DateTime<Utc>,
    ) -> Result<()>;
}

/// Client for the Unity IdM REST admin API
pub struct UnityApiClient {
    client: Client,
    base_url: Url,
    prefix: Vec<String>,
    user: String,
    password: String,
    group: String,
}

impl UnityApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        if config.base_url.cannot_be_a_base() {
            return Err(MonitorError::ConfigValue {
                key: "api.base_url",
                reason: format!("`{}` cannot be used as a base URL", config.base_url),
            });
        }

        let client = Client::builder()
            .danger_accept_invalid_certs(!config.cert_verify)
            .build()?;

        let prefix = [config.path.as_str(), config.version.as_str()]
            .iter()
            .flat_map(|part| part.split('/'))
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            prefix,
            user: config.user.clone(),
            password: config.password.clone(),
            group: config.group.clone(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| MonitorError::ConfigValue {
                key: "api.base_url",
                reason: "cannot be used as a base URL".to_string(),
            })?
            .pop_if_empty()
            .extend(&self.prefix)
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        trace!("{} {}", method, url);
        self.client
            .request(method, url)
            .basic_auth(&self.user, Some(&self.password))
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send().await?.error_for_status()?;
        Ok(response.json::<T>().await?)
    }

    async fn execute(&self, request: RequestBuilder) -> Result<()> {
        request.send().await?.error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl IdentityApi for UnityApiClient {
    async fn get_group(&self) -> Result<GroupContents> {
        let url = self.endpoint(&["group", self.group.as_str()])?;
        self.fetch(self.request(Method::GET, url)).await
    }

    async fn get_entity(&self, id: EntityId) -> Result<Entity> {
        let url = self.endpoint(&["entity", id.to_string().as_str()])?;
        self.fetch(self.request(Method::GET, url)).await
    }

    async fn get_entity_attrs(&self, id: EntityId, effective: bool) -> Result<Vec<Attribute>> {
        let url = self.endpoint(&["entity", id.to_string().as_str(), "attributes"])?;
        let request = self
            .request(Method::GET, url)
            .query(&[("effective", effective.to_string())]);
        self.fetch(request).await
    }

    async fn remove_entity_attr(&self, id: EntityId, name: &str) -> Result<()> {
        let url = self.endpoint(&["entity", id.to_string().as_str(), "attribute", name])?;
        self.execute(self.request(Method::DELETE, url)).await
    }

    async fn schedule_operation(
        &self,
        id: EntityId,
        operation: EntityOperation,
        when: DateTime<Utc>,
    ) -> Result<()> {
        let url = self.endpoint(&["entity", id.to_string().as_str(), "admin-schedule"])?;
        let request = self.request(Method::PUT, url).query(&[
            ("when", when.timestamp_millis().to_string()),
            ("operation", operation.as_str().to_string()),
        ]);
        self.execute(request).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;
    use wiremock::matchers::{basic_auth, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn api_config(base_url: &str) -> ApiConfig {
        ApiConfig {
            base_url: Url::parse(base_url).unwrap(),
            path: "rest-admin".to_string(),
            version: "v1".to_string(),
            user: "admin".to_string(),
            password: "secret".to_string(),
            cert_verify: true,
            group: "/".to_string(),
        }
    }

    async fn client_for(server: &MockServer) -> UnityApiClient {
        UnityApiClient::new(&api_config(&server.uri())).unwrap()
    }

    #[test]
    fn entity_decodes_unity_payload() {
        let entity: Entity = serde_json::from_value(json!({
            "entityInformation": {
                "entityId": 7,
                "state": "disabled",
                "scheduledOperation": null
            },
            "identities": [
                {"typeId": "userName", "value": "jdoe"},
                {"typeId": "persistent", "value": "urn:7"}
            ]
        }))
        .unwrap();

        assert_eq!(entity.entity_information.state, EntityState::Disabled);
        assert_eq!(entity.entity_information.scheduled_operation, None);
        assert_eq!(entity.identities.len(), 2);
        assert_eq!(entity.identities[1].type_id, PERSISTENT_IDENTITY_TYPE);
    }

    #[test]
    fn unknown_enum_values_do_not_fail_decoding() {
        let entity: Entity = serde_json::from_value(json!({
            "entityInformation": {"state": "frozen", "scheduledOperation": "ARCHIVE"}
        }))
        .unwrap();

        assert_eq!(entity.entity_information.state, EntityState::Unknown);
        assert_eq!(
            entity.entity_information.scheduled_operation,
            Some(EntityOperation::Other)
        );
        assert!(entity.identities.is_empty());

        let attr: Attribute = serde_json::from_value(json!({"visibility": "hidden"})).unwrap();
        assert_eq!(attr.name, None);
        assert!(!attr.is_fully_visible());
    }

    #[test]
    fn relative_base_url_is_rejected() {
        let mut config = api_config("https://unity.example.org");
        config.base_url = Url::parse("mailto:admin@example.org").unwrap();

        assert!(matches!(
            UnityApiClient::new(&config),
            Err(MonitorError::ConfigValue { key: "api.base_url", .. })
        ));
    }

    #[tokio::test]
    async fn get_group_requests_encoded_group_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest-admin/v1/group/%2F"))
            .and(basic_auth("admin", "secret"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"members": [1, 2, 3], "subGroups": []})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let group = client_for(&server).await.get_group().await.unwrap();
        assert_eq!(group.members, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn get_entity_attrs_passes_effective_flag() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest-admin/v1/entity/42/attributes"))
            .and(query_param("effective", "false"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"name": "email", "visibility": "full", "values": ["a@example.org"]},
                {"name": "cn", "visibility": "local"}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let attrs = client_for(&server)
            .await
            .get_entity_attrs(42, false)
            .await
            .unwrap();

        assert_eq!(attrs.len(), 2);
        assert!(attrs[0].is_fully_visible());
        assert_eq!(attrs[1].visibility, Some(AttributeVisibility::Local));
    }

    #[tokio::test]
    async fn remove_entity_attr_issues_delete() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/rest-admin/v1/entity/42/attribute/email"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .await
            .remove_entity_attr(42, "email")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn schedule_operation_sends_epoch_millis() {
        let when = Utc.with_ymd_and_hms(2027, 1, 2, 3, 4, 5).unwrap();
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/rest-admin/v1/entity/42/admin-schedule"))
            .and(query_param("when", when.timestamp_millis().to_string()))
            .and(query_param("operation", "REMOVE"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .await
            .schedule_operation(42, EntityOperation::Remove, when)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest-admin/v1/entity/9"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = client_for(&server).await.get_entity(9).await.unwrap_err();
        assert!(matches!(err, MonitorError::Api(_)));
    }
}
