// SPDX-FileCopyrightText: 2025 The traffic-openapi Authors
//
// SPDX-License-Identifier: ISC

//! Path template synthesis: segment classification and parameter naming.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static UUID_SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("uuid segment regex")
});

static NUMERIC_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+$").expect("numeric segment regex"));

/// Short git-style hashes.
static SHORT_HASH_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-fA-F]{6,12}$").expect("short hash regex"));

/// MD5 through SHA-256 sized hashes.
static LONG_HASH_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-fA-F]{32,64}$").expect("long hash regex"));

/// MongoDB ObjectId.
static OBJECT_ID_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-fA-F]{24}$").expect("object id regex"));

static OPAQUE_ID_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{16,}$").expect("opaque id regex"));

static DATE_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("date segment regex"));

/// Version prefixes like v1, v2, v1.0 stay literal.
static VERSION_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^v\d+(\.\d+)?$").expect("version segment regex"));

/// Classification of a single path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Literal,
    NumericId,
    Uuid,
    Hash,
    ObjectId,
    OpaqueId,
    Date,
    UnknownId,
}

/// Synthesizes `/users/{userId}`-style templates from concrete paths.
pub struct PathInferrer {
    resource_names: &'static HashMap<&'static str, &'static str>,
}

impl Default for PathInferrer {
    fn default() -> Self {
        Self::new()
    }
}

impl PathInferrer {
    pub fn new() -> Self {
        Self {
            resource_names: resource_dictionary(),
        }
    }

    /// Convert a concrete path into a parameterized template.
    ///
    /// Returns the template and the extracted parameter values.
    pub fn infer_template(&self, path: &str) -> (String, HashMap<String, String>) {
        let mut params = HashMap::new();

        let path = match path.find('?') {
            Some(idx) => &path[..idx],
            None => path,
        };

        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        if segments.is_empty() || (segments.len() == 1 && segments[0].is_empty()) {
            return ("/".to_string(), params);
        }

        let mut result = Vec::with_capacity(segments.len());
        let mut counts: HashMap<String, usize> = HashMap::new();

        for (i, segment) in segments.iter().enumerate() {
            if segment.is_empty() {
                result.push(String::new());
                continue;
            }

            let kind = self.classify_segment(segment);
            if kind == SegmentKind::Literal {
                result.push((*segment).to_string());
                continue;
            }

            let name = self.infer_param_name(&segments, i, kind, &counts);
            *counts.entry(base_name(&name)).or_insert(0) += 1;
            params.insert(name.clone(), (*segment).to_string());
            result.push(format!("{{{name}}}"));
        }

        (format!("/{}", result.join("/")), params)
    }

    /// Decide whether a segment is dynamic and of which kind.
    pub fn classify_segment(&self, segment: &str) -> SegmentKind {
        if VERSION_SEGMENT.is_match(segment) {
            return SegmentKind::Literal;
        }

        if UUID_SEGMENT.is_match(segment) {
            return SegmentKind::Uuid;
        }
        if OBJECT_ID_SEGMENT.is_match(segment) {
            return SegmentKind::ObjectId;
        }
        if NUMERIC_SEGMENT.is_match(segment) {
            return SegmentKind::NumericId;
        }
        if LONG_HASH_SEGMENT.is_match(segment) {
            return SegmentKind::Hash;
        }
        if SHORT_HASH_SEGMENT.is_match(segment) {
            // Short hex could be a literal path; only 8+ chars count as ids.
            if segment.len() >= 8 {
                return SegmentKind::Hash;
            }
            return SegmentKind::Literal;
        }
        if DATE_SEGMENT.is_match(segment) {
            return SegmentKind::Date;
        }
        if OPAQUE_ID_SEGMENT.is_match(segment) {
            return SegmentKind::OpaqueId;
        }
        if looks_like_id_segment(segment) {
            return SegmentKind::UnknownId;
        }

        SegmentKind::Literal
    }

    fn infer_param_name(
        &self,
        segments: &[&str],
        idx: usize,
        kind: SegmentKind,
        counts: &HashMap<String, usize>,
    ) -> String {
        if idx > 0 {
            let prev = segments[idx - 1].to_ascii_lowercase();
            let base = match self.resource_names.get(prev.as_str()) {
                Some(mapped) => (*mapped).to_string(),
                None => format!("{}Id", singularize(&prev)),
            };
            return with_suffix(base, counts);
        }

        // No preceding resource segment: name by class.
        let base = match kind {
            SegmentKind::Uuid => "uuid",
            SegmentKind::Date => "date",
            _ => "id",
        };
        with_suffix(base.to_string(), counts)
    }
}

fn with_suffix(base: String, counts: &HashMap<String, usize>) -> String {
    match counts.get(&base) {
        Some(&n) if n > 0 => format!("{base}{}", n + 1),
        _ => base,
    }
}

/// Strip a trailing collision counter so repeated parameters share a tally.
fn base_name(name: &str) -> String {
    name.trim_end_matches(|c: char| c.is_ascii_digit()).to_string()
}

/// Mostly-numeric segments longer than four characters are treated as ids.
fn looks_like_id_segment(segment: &str) -> bool {
    if segment.len() <= 4 {
        return false;
    }
    let digits = segment.chars().filter(|c| c.is_ascii_digit()).count();
    digits as f64 / segment.len() as f64 > 0.5
}

/// Best-effort plural-to-singular conversion.
pub fn singularize(word: &str) -> String {
    if word.len() < 2 {
        return word.to_string();
    }

    if let Some(stem) = word.strip_suffix("ies") {
        return format!("{stem}y");
    }
    if word.ends_with("es") {
        if word.ends_with("sses")
            || word.ends_with("shes")
            || word.ends_with("ches")
            || word.ends_with("xes")
        {
            return word[..word.len() - 2].to_string();
        }
        return word[..word.len() - 1].to_string();
    }
    if word.ends_with('s') && !word.ends_with("ss") {
        return word[..word.len() - 1].to_string();
    }

    word.to_string()
}

/// Strip the query string and trailing slash, ensuring a leading slash.
pub fn normalize_path(path: &str) -> String {
    let path = match path.find('?') {
        Some(idx) => &path[..idx],
        None => path,
    };
    let path = path.trim_end_matches('/');
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// Unique endpoint key: `"<METHOD> <template>"`.
pub fn endpoint_key(method: &str, path_template: &str) -> String {
    format!("{} {}", method.to_ascii_uppercase(), path_template)
}

/// One-shot template inference with a fresh inferrer.
pub fn infer_path_template(path: &str) -> (String, HashMap<String, String>) {
    PathInferrer::new().infer_template(path)
}

fn resource_dictionary() -> &'static HashMap<&'static str, &'static str> {
    static DICT: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
        let pairs: &[(&str, &str)] = &[
            // User-shaped resources
            ("users", "userId"),
            ("user", "userId"),
            ("members", "memberId"),
            ("member", "memberId"),
            ("customers", "customerId"),
            ("customer", "customerId"),
            ("employees", "employeeId"),
            ("employee", "employeeId"),
            ("authors", "authorId"),
            ("author", "authorId"),
            ("owners", "ownerId"),
            ("owner", "ownerId"),
            ("admins", "adminId"),
            ("admin", "adminId"),
            // Content
            ("posts", "postId"),
            ("post", "postId"),
            ("articles", "articleId"),
            ("article", "articleId"),
            ("comments", "commentId"),
            ("comment", "commentId"),
            ("reviews", "reviewId"),
            ("review", "reviewId"),
            ("replies", "replyId"),
            ("reply", "replyId"),
            ("messages", "messageId"),
            ("message", "messageId"),
            ("threads", "threadId"),
            ("thread", "threadId"),
            ("channels", "channelId"),
            ("channel", "channelId"),
            ("feeds", "feedId"),
            ("feed", "feedId"),
            ("pages", "pageId"),
            ("page", "pageId"),
            ("blogs", "blogId"),
            ("blog", "blogId"),
            // Commerce
            ("orders", "orderId"),
            ("order", "orderId"),
            ("products", "productId"),
            ("product", "productId"),
            ("items", "itemId"),
            ("item", "itemId"),
            ("carts", "cartId"),
            ("cart", "cartId"),
            ("invoices", "invoiceId"),
            ("invoice", "invoiceId"),
            ("payments", "paymentId"),
            ("payment", "paymentId"),
            ("transactions", "transactionId"),
            ("transaction", "transactionId"),
            ("subscriptions", "subscriptionId"),
            ("subscription", "subscriptionId"),
            ("plans", "planId"),
            ("plan", "planId"),
            ("coupons", "couponId"),
            ("coupon", "couponId"),
            ("discounts", "discountId"),
            ("discount", "discountId"),
            // Organizations
            ("accounts", "accountId"),
            ("account", "accountId"),
            ("organizations", "organizationId"),
            ("organization", "organizationId"),
            ("orgs", "orgId"),
            ("org", "orgId"),
            ("companies", "companyId"),
            ("company", "companyId"),
            ("workspaces", "workspaceId"),
            ("workspace", "workspaceId"),
            ("tenants", "tenantId"),
            ("tenant", "tenantId"),
            // Project work
            ("projects", "projectId"),
            ("project", "projectId"),
            ("tasks", "taskId"),
            ("task", "taskId"),
            ("issues", "issueId"),
            ("issue", "issueId"),
            ("tickets", "ticketId"),
            ("ticket", "ticketId"),
            ("milestones", "milestoneId"),
            ("milestone", "milestoneId"),
            ("sprints", "sprintId"),
            ("sprint", "sprintId"),
            ("releases", "releaseId"),
            ("release", "releaseId"),
            ("versions", "versionId"),
            ("version", "versionId"),
            ("builds", "buildId"),
            ("build", "buildId"),
            ("deployments", "deploymentId"),
            ("deployment", "deploymentId"),
            ("jobs", "jobId"),
            ("job", "jobId"),
            ("runs", "runId"),
            ("run", "runId"),
            ("pipelines", "pipelineId"),
            ("pipeline", "pipelineId"),
            // Teams and access
            ("teams", "teamId"),
            ("team", "teamId"),
            ("groups", "groupId"),
            ("group", "groupId"),
            ("roles", "roleId"),
            ("role", "roleId"),
            // Files and media
            ("files", "fileId"),
            ("file", "fileId"),
            ("documents", "documentId"),
            ("document", "documentId"),
            ("attachments", "attachmentId"),
            ("attachment", "attachmentId"),
            ("images", "imageId"),
            ("image", "imageId"),
            ("assets", "assetId"),
            ("asset", "assetId"),
            ("media", "mediaId"),
            ("folders", "folderId"),
            ("folder", "folderId"),
            ("directories", "directoryId"),
            ("directory", "directoryId"),
            // Events and notifications
            ("notifications", "notificationId"),
            ("notification", "notificationId"),
            ("events", "eventId"),
            ("event", "eventId"),
            ("webhooks", "webhookId"),
            ("webhook", "webhookId"),
            ("alerts", "alertId"),
            ("alert", "alertId"),
            ("logs", "logId"),
            ("log", "logId"),
            // Auth
            ("sessions", "sessionId"),
            ("session", "sessionId"),
            ("tokens", "tokenId"),
            ("token", "tokenId"),
            ("keys", "keyId"),
            ("key", "keyId"),
            ("secrets", "secretId"),
            ("secret", "secretId"),
            // Classification
            ("categories", "categoryId"),
            ("category", "categoryId"),
            ("tags", "tagId"),
            ("tag", "tagId"),
            ("labels", "labelId"),
            ("label", "labelId"),
            ("types", "typeId"),
            ("type", "typeId"),
            ("statuses", "statusId"),
            ("status", "statusId"),
            // Locations
            ("locations", "locationId"),
            ("location", "locationId"),
            ("addresses", "addressId"),
            ("address", "addressId"),
            ("regions", "regionId"),
            ("region", "regionId"),
            ("countries", "countryId"),
            ("country", "countryId"),
            ("cities", "cityId"),
            ("city", "cityId"),
            ("stores", "storeId"),
            ("store", "storeId"),
            ("warehouses", "warehouseId"),
            ("warehouse", "warehouseId"),
            // APIs and integrations
            ("apis", "apiId"),
            ("api", "apiId"),
            ("endpoints", "endpointId"),
            ("endpoint", "endpointId"),
            ("integrations", "integrationId"),
            ("integration", "integrationId"),
            ("connections", "connectionId"),
            ("connection", "connectionId"),
            ("apps", "appId"),
            ("app", "appId"),
            ("applications", "applicationId"),
            ("application", "applicationId"),
            ("services", "serviceId"),
            ("service", "serviceId"),
            ("resources", "resourceId"),
            ("resource", "resourceId"),
            // Repositories
            ("repositories", "repositoryId"),
            ("repository", "repositoryId"),
            ("repos", "repoId"),
            ("repo", "repoId"),
            ("branches", "branchId"),
            ("branch", "branchId"),
            ("commits", "commitId"),
            ("commit", "commitId"),
            ("pulls", "pullId"),
            ("pull", "pullId"),
            ("merges", "mergeId"),
            ("merge", "mergeId"),
            // Data stores
            ("databases", "databaseId"),
            ("database", "databaseId"),
            ("tables", "tableId"),
            ("table", "tableId"),
            ("collections", "collectionId"),
            ("collection", "collectionId"),
            ("records", "recordId"),
            ("record", "recordId"),
            ("entries", "entryId"),
            ("entry", "entryId"),
            ("rows", "rowId"),
            ("row", "rowId"),
            // Analytics
            ("metrics", "metricId"),
            ("metric", "metricId"),
            ("reports", "reportId"),
            ("report", "reportId"),
            ("dashboards", "dashboardId"),
            ("dashboard", "dashboardId"),
            ("charts", "chartId"),
            ("chart", "chartId"),
            ("widgets", "widgetId"),
            ("widget", "widgetId"),
            // Configuration
            ("settings", "settingId"),
            ("setting", "settingId"),
            ("preferences", "preferenceId"),
            ("preference", "preferenceId"),
            ("configurations", "configurationId"),
            ("configuration", "configurationId"),
            ("configs", "configId"),
            ("config", "configId"),
            ("options", "optionId"),
            ("option", "optionId"),
            ("features", "featureId"),
            ("feature", "featureId"),
            ("flags", "flagId"),
            ("flag", "flagId"),
        ];
        pairs.iter().copied().collect()
    });
    &DICT
}
