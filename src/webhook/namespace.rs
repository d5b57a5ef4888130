//! Namespace project annotation
//!
//! Decides, for one admission request, whether a namespace gets the Rancher
//! project annotation. The namespace's project label names a project by
//! display name; the annotation value is `<cluster ID>:<project ID>`.
//!
//! The decision is made in a single pass:
//! 1. Objects other than namespaces are skipped
//! 2. Namespaces without the project label are skipped
//! 3. Updates that keep the label and already carry the annotation are skipped
//! 4. The cluster ID is resolved (deny in strict mode, allow otherwise)
//! 5. The project ID is resolved (same policy)
//! 6. Namespaces already carrying the right value are skipped
//! 7. In dry-run mode the patch is only logged
//! 8. Otherwise the annotation patch is returned

use std::sync::Arc;

use k8s_openapi::api::core::v1::Namespace;
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, Operation};
use lattice_common::DecisionStatus;
use lattice_rancher::{IdentifierResolver, LookupError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::patch::build_annotation_patch;

/// Default label naming a namespace's project
pub const DEFAULT_PROJECT_LABEL: &str = "project";

/// Default annotation Rancher reads the project assignment from
pub const DEFAULT_PROJECT_ANNOTATION: &str = "field.cattle.io/projectId";

/// Kind of object this webhook governs
const NAMESPACE_KIND: &str = "Namespace";

/// Policy knobs for namespace mutation
#[derive(Debug, Clone)]
pub struct MutationConfig {
    /// Deny namespaces whose cluster or project cannot be resolved
    pub strict_mode: bool,
    /// Log the patch instead of returning it
    pub dry_run: bool,
    /// Label holding the project display name
    pub project_label: String,
    /// Annotation receiving `<cluster ID>:<project ID>`
    pub project_annotation: String,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            strict_mode: false,
            dry_run: false,
            project_label: DEFAULT_PROJECT_LABEL.to_string(),
            project_annotation: DEFAULT_PROJECT_ANNOTATION.to_string(),
        }
    }
}

/// Outcome of a single admission request
#[derive(Debug)]
pub enum Decision {
    /// Admit unchanged; the status says why
    Allow(DecisionStatus),
    /// Admit with the annotation patch
    Patch(json_patch::Patch),
    /// Reject with a message naming the failed lookup
    Deny(String),
    /// The request could not be processed
    Error(String),
}

impl Decision {
    /// Status label for logs and metrics
    pub fn status(&self) -> DecisionStatus {
        match self {
            Decision::Allow(status) => *status,
            Decision::Patch(_) => DecisionStatus::Mutated,
            Decision::Deny(_) => DecisionStatus::Denied,
            Decision::Error(_) => DecisionStatus::Error,
        }
    }

    /// Turn the decision into the response for `request`.
    ///
    /// A patch that cannot be serialized becomes an error response.
    pub fn into_response(
        self,
        request: &AdmissionRequest<DynamicObject>,
    ) -> (AdmissionResponse, DecisionStatus) {
        let status = self.status();
        let response = AdmissionResponse::from(request);
        match self {
            Decision::Allow(_) => (response, status),
            Decision::Deny(message) | Decision::Error(message) => (response.deny(message), status),
            Decision::Patch(patch) => match response.with_patch(patch) {
                Ok(response) => (response, status),
                Err(e) => {
                    error!(uid = %request.uid, error = %e, "Failed to serialize patch");
                    (
                        AdmissionResponse::from(request).deny(format!("failed to serialize patch: {e}")),
                        DecisionStatus::Error,
                    )
                }
            },
        }
    }
}

/// Upper-case operation name, as sent by the API server
pub fn operation_name(operation: &Operation) -> &'static str {
    match operation {
        Operation::Create => "CREATE",
        Operation::Update => "UPDATE",
        Operation::Delete => "DELETE",
        Operation::Connect => "CONNECT",
    }
}

/// Decides project annotations for namespaces
pub struct NamespaceMutator {
    resolver: Arc<dyn IdentifierResolver>,
    config: MutationConfig,
}

impl NamespaceMutator {
    /// Create a mutator resolving identifiers through `resolver`
    pub fn new(resolver: Arc<dyn IdentifierResolver>, config: MutationConfig) -> Self {
        Self { resolver, config }
    }

    /// Active policy
    pub fn config(&self) -> &MutationConfig {
        &self.config
    }

    /// Decide the outcome of `request` arriving from cluster `cluster_name`
    pub async fn mutate(
        &self,
        cluster_name: &str,
        request: &AdmissionRequest<DynamicObject>,
        cancel: &CancellationToken,
    ) -> Decision {
        if request.kind.kind != NAMESPACE_KIND {
            debug!(kind = %request.kind.kind, "Skipping non-namespace object");
            return Decision::Allow(DecisionStatus::Skipped);
        }

        let namespace = match parse_namespace(request.object.as_ref()) {
            Ok(namespace) => namespace,
            Err(message) => {
                error!(error = %message, "Failed to decode namespace");
                return Decision::Error(message);
            }
        };
        let name = namespace
            .metadata
            .name
            .clone()
            .unwrap_or_else(|| request.name.clone());

        let Some(project) = label(&namespace, &self.config.project_label) else {
            debug!(
                namespace = %name,
                label = %self.config.project_label,
                "Namespace has no project label"
            );
            return Decision::Allow(DecisionStatus::Skipped);
        };
        let current = annotation(&namespace, &self.config.project_annotation);

        if request.operation == Operation::Update
            && self.label_unchanged(request.old_object.as_ref(), project)
            && current.is_some_and(|value| !value.is_empty())
        {
            debug!(
                namespace = %name,
                project = %project,
                "Project label unchanged and annotation present"
            );
            return Decision::Allow(DecisionStatus::Skipped);
        }

        info!(
            namespace = %name,
            cluster = %cluster_name,
            project = %project,
            operation = operation_name(&request.operation),
            "Resolving project for namespace"
        );

        let cluster_id = match self.resolver.resolve_cluster(cluster_name, cancel).await {
            Ok(id) => id,
            Err(e) => {
                return self.lookup_failed(
                    &name,
                    "cluster_not_found",
                    format!("failed to get cluster ID: {e}"),
                    &e,
                )
            }
        };

        let project_id = match self.resolver.resolve_project(&cluster_id, project, cancel).await {
            Ok(id) => id,
            Err(e) => {
                return self.lookup_failed(
                    &name,
                    "project_not_found",
                    format!("failed to get project ID for '{project}': {e}"),
                    &e,
                )
            }
        };

        let desired = format!("{cluster_id}:{project_id}");
        if current == Some(desired.as_str()) {
            debug!(
                namespace = %name,
                annotation = %self.config.project_annotation,
                value = %desired,
                "Project annotation already set"
            );
            return Decision::Allow(DecisionStatus::Skipped);
        }

        if self.config.dry_run {
            info!(
                namespace = %name,
                cluster_id = %cluster_id,
                project_id = %project_id,
                annotation = %self.config.project_annotation,
                value = %desired,
                "[DRY-RUN] Would add project annotation to namespace"
            );
            return Decision::Allow(DecisionStatus::DryRun);
        }

        let patch = build_annotation_patch(
            namespace.metadata.annotations.as_ref(),
            &self.config.project_annotation,
            &desired,
        );

        info!(
            namespace = %name,
            cluster_id = %cluster_id,
            project_id = %project_id,
            annotation = %self.config.project_annotation,
            value = %desired,
            "Adding project annotation to namespace"
        );
        Decision::Patch(patch)
    }

    /// Whether the old object carries the same project label value.
    /// An old object that cannot be decoded never counts as unchanged.
    fn label_unchanged(&self, old: Option<&DynamicObject>, project: &str) -> bool {
        let Some(old) = old else {
            return false;
        };
        match old.clone().try_parse::<Namespace>() {
            Ok(old) => label(&old, &self.config.project_label) == Some(project),
            Err(e) => {
                debug!(error = %e, "Could not decode old namespace");
                false
            }
        }
    }

    fn lookup_failed(
        &self,
        namespace: &str,
        reason: &str,
        message: String,
        error: &LookupError,
    ) -> Decision {
        if self.config.strict_mode {
            warn!(namespace = %namespace, error = %error, "Denying namespace");
            return Decision::Deny(message);
        }
        warn!(
            namespace = %namespace,
            reason,
            error = %error,
            "Allowing namespace without project annotation (strict mode disabled)"
        );
        Decision::Allow(DecisionStatus::Allowed)
    }
}

fn parse_namespace(object: Option<&DynamicObject>) -> Result<Namespace, String> {
    let object = object.ok_or_else(|| "admission request carries no namespace object".to_string())?;
    object
        .clone()
        .try_parse::<Namespace>()
        .map_err(|e| format!("failed to unmarshal namespace: {e}"))
}

fn label<'a>(namespace: &'a Namespace, key: &str) -> Option<&'a str> {
    namespace
        .metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(key))
        .map(String::as_str)
}

fn annotation<'a>(namespace: &'a Namespace, key: &str) -> Option<&'a str> {
    namespace
        .metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(key))
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kube::core::admission::AdmissionReview;
    use lattice_rancher::{ApiErrorKind, BackendError};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const CLUSTER: &str = "prod";
    const CLUSTER_ID: &str = "c-m-abc123";
    const PROJECT_ID: &str = "p-xyz789";
    const ANNOTATION_VALUE: &str = "c-m-abc123:p-xyz789";

    /// Resolver with fixed answers that counts its calls
    struct FixedResolver {
        cluster_id: Option<&'static str>,
        project_id: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl FixedResolver {
        fn resolving() -> Self {
            Self {
                cluster_id: Some(CLUSTER_ID),
                project_id: Some(PROJECT_ID),
                calls: AtomicUsize::new(0),
            }
        }

        fn without_cluster() -> Self {
            Self {
                cluster_id: None,
                ..Self::resolving()
            }
        }

        fn without_project() -> Self {
            Self {
                project_id: None,
                ..Self::resolving()
            }
        }
    }

    #[async_trait]
    impl IdentifierResolver for FixedResolver {
        async fn resolve_cluster(
            &self,
            cluster_name: &str,
            _cancel: &CancellationToken,
        ) -> Result<String, LookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.cluster_id
                .map(str::to_string)
                .ok_or_else(|| LookupError::ClusterApi {
                    cluster: cluster_name.to_string(),
                    source: BackendError::new(ApiErrorKind::NotFound, "not found"),
                })
        }

        async fn resolve_project(
            &self,
            cluster_id: &str,
            display_name: &str,
            _cancel: &CancellationToken,
        ) -> Result<String, LookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.project_id
                .map(str::to_string)
                .ok_or_else(|| LookupError::ProjectNotFound {
                    cluster_id: cluster_id.to_string(),
                    project: display_name.to_string(),
                })
        }

        async fn health_check(&self, _cancel: &CancellationToken) -> Result<(), LookupError> {
            Ok(())
        }
    }

    fn namespace(labels: Value, annotations: Option<Value>) -> Value {
        let mut metadata = json!({ "name": "team-a", "labels": labels });
        if let Some(annotations) = annotations {
            metadata["annotations"] = annotations;
        }
        json!({ "apiVersion": "v1", "kind": "Namespace", "metadata": metadata })
    }

    fn request(
        kind: &str,
        operation: &str,
        object: Value,
        old_object: Option<Value>,
    ) -> AdmissionRequest<DynamicObject> {
        let review: AdmissionReview<DynamicObject> = serde_json::from_value(json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
                "kind": { "group": "", "version": "v1", "kind": kind },
                "resource": { "group": "", "version": "v1", "resource": "namespaces" },
                "name": "team-a",
                "operation": operation,
                "userInfo": { "username": "admin" },
                "object": object,
                "oldObject": old_object,
                "dryRun": false
            }
        }))
        .unwrap();
        review.try_into().unwrap()
    }

    fn create(object: Value) -> AdmissionRequest<DynamicObject> {
        request("Namespace", "CREATE", object, None)
    }

    fn mutator(resolver: FixedResolver, config: MutationConfig) -> (NamespaceMutator, Arc<FixedResolver>) {
        let resolver = Arc::new(resolver);
        (NamespaceMutator::new(resolver.clone(), config), resolver)
    }

    fn strict() -> MutationConfig {
        MutationConfig {
            strict_mode: true,
            ..Default::default()
        }
    }

    fn patch_json(decision: Decision) -> Value {
        match decision {
            Decision::Patch(patch) => serde_json::to_value(&patch).unwrap(),
            other => panic!("expected a patch, got {other:?}"),
        }
    }

    // =========================================================================
    // Skips
    // =========================================================================

    #[tokio::test]
    async fn non_namespace_kind_is_skipped() {
        let (mutator, resolver) = mutator(FixedResolver::resolving(), MutationConfig::default());
        let pod = json!({ "apiVersion": "v1", "kind": "Pod", "metadata": { "name": "web" } });

        let decision = mutator
            .mutate(CLUSTER, &request("Pod", "CREATE", pod, None), &CancellationToken::new())
            .await;

        assert!(matches!(decision, Decision::Allow(DecisionStatus::Skipped)));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn namespace_without_label_is_skipped() {
        let (mutator, resolver) = mutator(FixedResolver::resolving(), MutationConfig::default());
        let object = namespace(json!({ "team": "a" }), None);

        let decision = mutator
            .mutate(CLUSTER, &create(object), &CancellationToken::new())
            .await;

        assert_eq!(decision.status(), DecisionStatus::Skipped);
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn custom_label_is_honored() {
        let config = MutationConfig {
            project_label: "rancher.io/project".to_string(),
            ..Default::default()
        };
        let (mutator, _) = mutator(FixedResolver::resolving(), config);
        let object = namespace(json!({ "rancher.io/project": "platform" }), None);

        let decision = mutator
            .mutate(CLUSTER, &create(object), &CancellationToken::new())
            .await;

        assert_eq!(decision.status(), DecisionStatus::Mutated);
    }

    #[tokio::test]
    async fn correct_annotation_is_a_fixed_point() {
        let (mutator, resolver) = mutator(FixedResolver::resolving(), MutationConfig::default());
        let object = namespace(
            json!({ "project": "platform" }),
            Some(json!({ DEFAULT_PROJECT_ANNOTATION: ANNOTATION_VALUE })),
        );

        let decision = mutator
            .mutate(CLUSTER, &create(object), &CancellationToken::new())
            .await;

        assert!(matches!(decision, Decision::Allow(DecisionStatus::Skipped)));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn correct_annotation_is_a_fixed_point_on_update() {
        let annotated = Some(json!({ DEFAULT_PROJECT_ANNOTATION: ANNOTATION_VALUE }));

        // No old object: nothing to short-circuit on
        let (mutator, resolver) = mutator(FixedResolver::resolving(), MutationConfig::default());
        let object = namespace(json!({ "project": "platform" }), annotated.clone());
        let decision = mutator
            .mutate(
                CLUSTER,
                &request("Namespace", "UPDATE", object, None),
                &CancellationToken::new(),
            )
            .await;
        assert!(matches!(decision, Decision::Allow(DecisionStatus::Skipped)));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 2);

        // Relabelled to a name that resolves to the same project
        let (mutator, resolver) = self::mutator(FixedResolver::resolving(), MutationConfig::default());
        let object = namespace(json!({ "project": "Platform" }), annotated.clone());
        let old = namespace(json!({ "project": "platform" }), annotated);
        let decision = mutator
            .mutate(
                CLUSTER,
                &request("Namespace", "UPDATE", object, Some(old)),
                &CancellationToken::new(),
            )
            .await;
        assert!(matches!(decision, Decision::Allow(DecisionStatus::Skipped)));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 2);
    }

    // =========================================================================
    // Update short-circuit
    // =========================================================================

    #[tokio::test]
    async fn update_with_unchanged_label_and_annotation_skips_resolution() {
        let (mutator, resolver) = mutator(FixedResolver::resolving(), MutationConfig::default());
        let object = namespace(
            json!({ "project": "platform" }),
            Some(json!({ DEFAULT_PROJECT_ANNOTATION: "c-m-old:p-old" })),
        );
        let old = object.clone();

        let decision = mutator
            .mutate(
                CLUSTER,
                &request("Namespace", "UPDATE", object, Some(old)),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(decision.status(), DecisionStatus::Skipped);
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn update_with_changed_label_is_resolved_again() {
        let (mutator, _) = mutator(FixedResolver::resolving(), MutationConfig::default());
        let object = namespace(
            json!({ "project": "platform" }),
            Some(json!({ DEFAULT_PROJECT_ANNOTATION: "c-m-old:p-old" })),
        );
        let old = namespace(
            json!({ "project": "data" }),
            Some(json!({ DEFAULT_PROJECT_ANNOTATION: "c-m-old:p-old" })),
        );

        let decision = mutator
            .mutate(
                CLUSTER,
                &request("Namespace", "UPDATE", object, Some(old)),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(
            patch_json(decision),
            json!([{
                "op": "add",
                "path": "/metadata/annotations/field.cattle.io~1projectId",
                "value": ANNOTATION_VALUE
            }])
        );
    }

    #[tokio::test]
    async fn update_without_annotation_is_patched() {
        let (mutator, _) = mutator(FixedResolver::resolving(), MutationConfig::default());
        let object = namespace(json!({ "project": "platform" }), None);
        let old = object.clone();

        let decision = mutator
            .mutate(
                CLUSTER,
                &request("Namespace", "UPDATE", object, Some(old)),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(decision.status(), DecisionStatus::Mutated);
    }

    #[tokio::test]
    async fn undecodable_old_object_falls_through() {
        let (mutator, resolver) = mutator(FixedResolver::resolving(), MutationConfig::default());
        let object = namespace(
            json!({ "project": "platform" }),
            Some(json!({ DEFAULT_PROJECT_ANNOTATION: "c-m-old:p-old" })),
        );
        let mut old = object.clone();
        old["spec"] = json!("not-an-object");

        let decision = mutator
            .mutate(
                CLUSTER,
                &request("Namespace", "UPDATE", object, Some(old)),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(decision.status(), DecisionStatus::Mutated);
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 2);
    }

    // =========================================================================
    // Resolution failures
    // =========================================================================

    #[tokio::test]
    async fn missing_cluster_strict_denies() {
        let (mutator, _) = mutator(FixedResolver::without_cluster(), strict());
        let object = namespace(json!({ "project": "platform" }), None);

        let decision = mutator
            .mutate(CLUSTER, &create(object), &CancellationToken::new())
            .await;

        match decision {
            Decision::Deny(message) => {
                assert!(message.starts_with("failed to get cluster ID: "));
                assert!(message.contains(CLUSTER));
            }
            other => panic!("expected deny, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_cluster_permissive_allows_without_patch() {
        let (mutator, resolver) = mutator(FixedResolver::without_cluster(), MutationConfig::default());
        let object = namespace(json!({ "project": "platform" }), None);

        let decision = mutator
            .mutate(CLUSTER, &create(object), &CancellationToken::new())
            .await;

        assert!(matches!(decision, Decision::Allow(DecisionStatus::Allowed)));
        // Project resolution never runs without a cluster ID
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_project_strict_denies_with_project_name() {
        let (mutator, _) = mutator(FixedResolver::without_project(), strict());
        let object = namespace(json!({ "project": "platform" }), None);

        let decision = mutator
            .mutate(CLUSTER, &create(object), &CancellationToken::new())
            .await;

        match decision {
            Decision::Deny(message) => assert_eq!(
                message,
                "failed to get project ID for 'platform': project platform not found in cluster c-m-abc123"
            ),
            other => panic!("expected deny, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_project_permissive_allows() {
        let (mutator, _) = mutator(FixedResolver::without_project(), MutationConfig::default());
        let object = namespace(json!({ "project": "platform" }), None);

        let decision = mutator
            .mutate(CLUSTER, &create(object), &CancellationToken::new())
            .await;

        assert_eq!(decision.status(), DecisionStatus::Allowed);
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    #[tokio::test]
    async fn bare_namespace_gets_container_and_annotation() {
        let (mutator, _) = mutator(FixedResolver::resolving(), MutationConfig::default());
        let object = namespace(json!({ "project": "platform" }), None);

        let decision = mutator
            .mutate(CLUSTER, &create(object), &CancellationToken::new())
            .await;

        assert_eq!(
            patch_json(decision),
            json!([
                { "op": "add", "path": "/metadata/annotations", "value": {} },
                {
                    "op": "add",
                    "path": "/metadata/annotations/field.cattle.io~1projectId",
                    "value": ANNOTATION_VALUE
                }
            ])
        );
    }

    #[tokio::test]
    async fn stale_annotation_is_replaced() {
        let (mutator, _) = mutator(FixedResolver::resolving(), MutationConfig::default());
        let object = namespace(
            json!({ "project": "platform" }),
            Some(json!({ DEFAULT_PROJECT_ANNOTATION: "c-m-old:p-old" })),
        );

        let decision = mutator
            .mutate(CLUSTER, &create(object), &CancellationToken::new())
            .await;

        assert_eq!(patch_json(decision).as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn annotation_key_with_tilde_and_slash_is_escaped() {
        let config = MutationConfig {
            project_annotation: "example.com/a~b".to_string(),
            ..Default::default()
        };
        let (mutator, _) = mutator(FixedResolver::resolving(), config);
        let object = namespace(json!({ "project": "platform" }), Some(json!({})));

        let decision = mutator
            .mutate(CLUSTER, &create(object), &CancellationToken::new())
            .await;

        assert_eq!(
            patch_json(decision)[0]["path"],
            "/metadata/annotations/example.com~1a~0b"
        );
    }

    #[tokio::test]
    async fn dry_run_resolves_but_does_not_patch() {
        let config = MutationConfig {
            dry_run: true,
            ..Default::default()
        };
        let (mutator, resolver) = mutator(FixedResolver::resolving(), config);
        let object = namespace(json!({ "project": "platform" }), None);

        let decision = mutator
            .mutate(CLUSTER, &create(object), &CancellationToken::new())
            .await;

        assert!(matches!(decision, Decision::Allow(DecisionStatus::DryRun)));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 2);
    }

    // =========================================================================
    // Malformed input and responses
    // =========================================================================

    #[tokio::test]
    async fn undecodable_namespace_is_an_error_in_any_mode() {
        let mut object = namespace(json!({ "project": "platform" }), None);
        object["spec"] = json!("not-an-object");

        for config in [MutationConfig::default(), strict()] {
            let (mutator, _) = mutator(FixedResolver::resolving(), config);
            let decision = mutator
                .mutate(CLUSTER, &create(object.clone()), &CancellationToken::new())
                .await;

            match decision {
                Decision::Error(message) => {
                    assert!(message.starts_with("failed to unmarshal namespace"))
                }
                other => panic!("expected error, got {other:?}"),
            }
        }
    }

    #[test]
    fn patch_decision_sets_patch_and_uid() {
        let req = create(namespace(json!({ "project": "platform" }), None));
        let patch = build_annotation_patch(None, DEFAULT_PROJECT_ANNOTATION, ANNOTATION_VALUE);

        let (response, status) = Decision::Patch(patch).into_response(&req);

        assert_eq!(status, DecisionStatus::Mutated);
        assert!(response.allowed);
        assert_eq!(response.uid, req.uid);
        let body: Value = serde_json::from_slice(response.patch.as_deref().unwrap()).unwrap();
        assert_eq!(body[1]["value"], ANNOTATION_VALUE);
    }

    #[test]
    fn deny_decision_carries_message() {
        let req = create(namespace(json!({ "project": "platform" }), None));

        let (response, status) =
            Decision::Deny("failed to get cluster ID: boom".to_string()).into_response(&req);

        assert_eq!(status, DecisionStatus::Denied);
        assert!(!response.allowed);
        assert_eq!(response.result.message, "failed to get cluster ID: boom");
        assert!(response.patch.is_none());
    }

    #[test]
    fn operation_names_match_api_server() {
        assert_eq!(operation_name(&Operation::Create), "CREATE");
        assert_eq!(operation_name(&Operation::Update), "UPDATE");
        assert_eq!(operation_name(&Operation::Delete), "DELETE");
        assert_eq!(operation_name(&Operation::Connect), "CONNECT");
    }
}
