use async_trait::async_trait;
use corral_core::k8s_openapi::api::core::v1::{Binding, ObjectReference};
use corral_core::k8s_openapi::apimachinery::pkg::apis::meta::v1::DeleteOptions as ApiDeleteOptions;
use corral_core::k8s_openapi::List;
use corral_core::{node_name, CorralError, Event, Node, ObjectMeta, Pod, Result, WorkloadKey};
use corral_scheduler::{DeleteOptions, OrchestratorApi};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

/// Source of full node and pod listings, used to refresh the cluster cache
#[async_trait]
pub trait ClusterLister: Send + Sync {
    async fn list_nodes(&self) -> Result<Vec<Node>>;
    async fn list_pods(&self) -> Result<Vec<Pod>>;
}

/// HTTP client for the orchestrator's core/v1 API
pub struct ApiClient {
    base_url: String,
    client: Client,
}

/// Translate a non-success response into the matching core error
fn status_error(status: StatusCode, key: &str, body: &str) -> CorralError {
    match status {
        StatusCode::NOT_FOUND => CorralError::not_found(key),
        StatusCode::CONFLICT => CorralError::conflict(key, body),
        _ => CorralError::transport_error(
            format!("request for {} failed with status {}: {}", key, status, body),
            None,
        ),
    }
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn pod_url(&self, namespace: &str, name: &str) -> String {
        format!("{}/api/v1/namespaces/{}/pods/{}", self.base_url, namespace, name)
    }

    async fn send(&self, request: RequestBuilder, key: &str) -> Result<reqwest::Response> {
        let resp = request.send().await.map_err(|e| {
            CorralError::transport_error(format!("HTTP request for {} failed", key), Some(Box::new(e)))
        })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(status, key, &body));
        }
        Ok(resp)
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder, key: &str) -> Result<T> {
        self.send(request, key).await?.json::<T>().await.map_err(|e| {
            CorralError::serialization_error(format!("Failed to parse response for {}", key), Some(Box::new(e)))
        })
    }
}

#[async_trait]
impl OrchestratorApi for ApiClient {
    /// GET /api/v1/namespaces/{namespace}/pods/{name}
    async fn get_workload(&self, namespace: &str, name: &str) -> Result<Pod> {
        let url = self.pod_url(namespace, name);
        debug!("GET {}", url);
        self.fetch(self.client.get(&url), &format!("{}/{}", namespace, name))
            .await
    }

    /// PUT /api/v1/namespaces/{namespace}/pods/{name}/status
    async fn update_workload_status(&self, pod: &Pod) -> Result<Pod> {
        let key = WorkloadKey::from_pod(pod)?;
        let url = format!("{}/status", self.pod_url(&key.namespace, &key.name));
        debug!("PUT {}", url);
        self.fetch(self.client.put(&url).json(pod), &key.to_string())
            .await
    }

    /// POST /api/v1/namespaces/{namespace}/pods/{name}/binding
    async fn bind(&self, pod: &Pod, node: &str) -> Result<()> {
        let key = WorkloadKey::from_pod(pod)?;
        let binding = Binding {
            metadata: ObjectMeta {
                name: Some(key.name.clone()),
                namespace: Some(key.namespace.clone()),
                uid: pod.metadata.uid.clone(),
                annotations: pod.metadata.annotations.clone(),
                ..Default::default()
            },
            target: ObjectReference {
                kind: Some("Node".to_string()),
                name: Some(node.to_string()),
                ..Default::default()
            },
        };

        let url = format!("{}/binding", self.pod_url(&key.namespace, &key.name));
        debug!("POST {} -> {}", url, node);
        self.send(self.client.post(&url).json(&binding), &key.to_string())
            .await?;
        Ok(())
    }

    /// DELETE /api/v1/namespaces/{namespace}/pods/{name}
    async fn delete_workload(&self, namespace: &str, name: &str, options: &DeleteOptions) -> Result<()> {
        let body = ApiDeleteOptions {
            grace_period_seconds: Some(options.grace_period_seconds),
            propagation_policy: Some(options.propagation_policy.as_str().to_string()),
            ..Default::default()
        };
        let url = self.pod_url(namespace, name);
        debug!("DELETE {}", url);
        self.send(self.client.delete(&url).json(&body), &format!("{}/{}", namespace, name))
            .await?;
        Ok(())
    }

    /// GET /api/v1/nodes/{name}
    async fn get_node(&self, name: &str) -> Result<Node> {
        let url = format!("{}/api/v1/nodes/{}", self.base_url, name);
        debug!("GET {}", url);
        self.fetch(self.client.get(&url), name).await
    }

    /// PUT /api/v1/nodes/{name}/status
    ///
    /// The node's resource version travels in the body, so a stale update
    /// comes back as a conflict.
    async fn update_node_status(&self, node: &Node) -> Result<Node> {
        let name = node_name(node);
        let url = format!("{}/api/v1/nodes/{}/status", self.base_url, name);
        debug!("PUT {}", url);
        self.fetch(self.client.put(&url).json(node), name).await
    }

    /// POST /api/v1/namespaces/{namespace}/events
    async fn create_event(&self, event: &Event) -> Result<()> {
        let namespace = event.metadata.namespace.as_deref().unwrap_or("default");
        let url = format!("{}/api/v1/namespaces/{}/events", self.base_url, namespace);
        debug!("POST {}", url);
        self.send(self.client.post(&url).json(event), "event").await?;
        Ok(())
    }
}

#[async_trait]
impl ClusterLister for ApiClient {
    /// GET /api/v1/nodes
    async fn list_nodes(&self) -> Result<Vec<Node>> {
        let url = format!("{}/api/v1/nodes", self.base_url);
        debug!("GET {}", url);
        let list: List<Node> = self.fetch(self.client.get(&url), "nodes").await?;
        Ok(list.items)
    }

    /// GET /api/v1/pods
    async fn list_pods(&self) -> Result<Vec<Pod>> {
        let url = format!("{}/api/v1/pods", self.base_url);
        debug!("GET {}", url);
        let list: List<Pod> = self.fetch(self.client.get(&url), "pods").await?;
        Ok(list.items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(status_error(StatusCode::NOT_FOUND, "default/web", "").is_not_found());
        assert!(status_error(StatusCode::CONFLICT, "n1", "stale").is_conflict());

        let err = status_error(StatusCode::INTERNAL_SERVER_ERROR, "n1", "boom");
        assert!(matches!(err, CorralError::TransportError { .. }));
        assert!(err.to_string().contains("500"));
    }

    #[test]
    fn test_base_url_trimmed() {
        let client = ApiClient::new("http://127.0.0.1:6443/");
        assert_eq!(client.base_url(), "http://127.0.0.1:6443");
        assert_eq!(
            client.pod_url("default", "web"),
            "http://127.0.0.1:6443/api/v1/namespaces/default/pods/web"
        );
    }
}
