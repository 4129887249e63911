//! Request-level tests for the webhook routes

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::test_utils::{cluster_config, namespace, namespaced_config, pod_with_images, stores, opt_out_selector};
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use serde_json::{Value, json};
    use std::collections::BTreeMap;
    use tower::ServiceExt;

    fn state(stores: Stores) -> Arc<WebhookState> {
        stores.mark_ready();
        Arc::new(WebhookState {
            stores,
            metrics: Metrics::new().unwrap(),
            operator_namespace: "openshift-multiarch-tuning-operator".to_string(),
        })
    }

    fn admission(operation: &str, namespace: Option<&str>, object: Option<Value>, old: Option<Value>) -> Value {
        let kind = object
            .as_ref()
            .or(old.as_ref())
            .and_then(|o| o["kind"].as_str())
            .unwrap_or("Pod")
            .to_string();
        json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "b1f5e0c2",
                "kind": {"group": "", "version": "v1", "kind": kind},
                "resource": {"group": "", "version": "v1", "resource": format!("{}s", kind.to_lowercase())},
                "userInfo": {"username": "system:serviceaccount:app:deployer"},
                "operation": operation,
                "namespace": namespace,
                "object": object,
                "oldObject": old,
            }
        })
    }

    async fn post(state: Arc<WebhookState>, path: &str, body: Value) -> Value {
        let response = router(state)
            .oneshot(
                Request::post(path)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn decoded_patch(answer: &Value) -> Vec<Value> {
        let bytes: Vec<u8> = serde_json::from_value(answer["response"]["patch"].clone()).unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_pod_in_scope_is_gated() {
        let state = state(stores(Some(cluster_config(None, None)), vec![], vec![namespace("app", &[])]));
        let pod = pod_with_images("app", "web", &["quay.io/a:1"]);
        let body = admission("CREATE", Some("app"), Some(serde_json::to_value(&pod).unwrap()), None);

        let answer = post(state.clone(), MUTATE_POD_PATH, body).await;
        assert_eq!(answer["response"]["uid"], "b1f5e0c2");
        assert_eq!(answer["response"]["allowed"], true);
        assert_eq!(answer["response"]["patchType"], "JSONPatch");
        let patch = decoded_patch(&answer);
        assert_eq!(patch[0]["path"], "/spec/schedulingGates");
        assert_eq!(state.metrics.pods_gated.get(), 1);
    }

    #[tokio::test]
    async fn test_pod_in_opted_out_namespace_is_not_gated() {
        let labels = [("multiarch.openshift.io/exclude-pod-placement", "")];
        let state = state(stores(
            Some(cluster_config(Some(opt_out_selector()), None)),
            vec![],
            vec![namespace("legacy", &labels)],
        ));
        let pod = pod_with_images("legacy", "web", &["quay.io/a:1"]);
        let body = admission("CREATE", Some("legacy"), Some(serde_json::to_value(&pod).unwrap()), None);

        let answer = post(state.clone(), MUTATE_POD_PATH, body).await;
        assert_eq!(answer["response"]["allowed"], true);
        assert!(answer["response"].get("patch").is_none());
        assert_eq!(state.metrics.pods_gated.get(), 0);
    }

    #[tokio::test]
    async fn test_undecodable_pod_fails_open() {
        let state = state(stores(Some(cluster_config(None, None)), vec![], vec![]));
        let body = admission("CREATE", Some("app"), Some(json!({"spec": {"containers": "nope"}})), None);

        let answer = post(state, MUTATE_POD_PATH, body).await;
        assert_eq!(answer["response"]["allowed"], true);
        assert!(answer["response"].get("patch").is_none());
    }

    #[tokio::test]
    async fn test_cluster_config_delete_denied_with_dependents() {
        let state = state(stores(
            Some(cluster_config(None, None)),
            vec![namespaced_config("app", "ppc", 10, None)],
            vec![],
        ));
        let old = serde_json::to_value(cluster_config(None, None)).unwrap();
        let body = admission("DELETE", None, None, Some(old));

        let answer = post(state, VALIDATE_CLUSTER_CONFIG_PATH, body).await;
        assert_eq!(answer["response"]["allowed"], false);
        assert!(answer["response"]["status"]["message"].as_str().unwrap().contains("app/ppc"));
    }

    #[tokio::test]
    async fn test_duplicate_priority_denied() {
        let state = state(stores(
            Some(cluster_config(None, None)),
            vec![namespaced_config("app", "first", 5, None)],
            vec![],
        ));
        let object = serde_json::to_value(namespaced_config("app", "second", 5, None)).unwrap();

        let denied = post(
            state.clone(),
            VALIDATE_NAMESPACED_CONFIG_PATH,
            admission("CREATE", Some("app"), Some(object.clone()), None),
        )
        .await;
        assert_eq!(denied["response"]["allowed"], false);

        // same priority in another namespace is fine
        let mut elsewhere = object;
        elsewhere["metadata"]["namespace"] = json!("other");
        let allowed = post(
            state,
            VALIDATE_NAMESPACED_CONFIG_PATH,
            admission("CREATE", Some("other"), Some(elsewhere), None),
        )
        .await;
        assert_eq!(allowed["response"]["allowed"], true);
    }

    #[tokio::test]
    async fn test_conversion_route() {
        let state = state(stores(None, vec![], vec![]));
        let body = json!({
            "apiVersion": "apiextensions.k8s.io/v1",
            "kind": "ConversionReview",
            "request": {
                "uid": "c0",
                "desiredAPIVersion": "multiarch.openshift.io/v1alpha1",
                "objects": [{
                    "apiVersion": "multiarch.openshift.io/v1beta1",
                    "kind": "ClusterPodPlacementConfig",
                    "metadata": {"name": "cluster"},
                    "spec": {
                        "logVerbosity": "Normal",
                        "plugins": {"nodeAffinityScoring": {"enabled": true, "platforms": [{"architecture": "arm64", "weight": 50}]}}
                    }
                }]
            }
        });
        let answer = post(state, CONVERT_PATH, body).await;
        assert_eq!(answer["response"]["result"]["status"], "Success");
        let converted = &answer["response"]["convertedObjects"][0];
        assert_eq!(converted["apiVersion"], "multiarch.openshift.io/v1alpha1");
        let annotations: BTreeMap<String, String> =
            serde_json::from_value(converted["metadata"]["annotations"].clone()).unwrap();
        assert!(annotations.contains_key(crds::V1BETA1_PLUGINS_ANNOTATION));
    }
}
