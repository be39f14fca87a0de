//! Resource type registry
//!
//! The closed set of resource types the engine knows how to mirror and push,
//! together with the push configuration: dependency-ordered push tiers, the
//! types that must never be pushed, the types whose predefined instances are
//! skipped by content, and the read-only fields stripped before comparison.
//!
//! Everything here is configuration data. Per-type behavior differences are
//! expressed through these tables, never through per-type code.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Product tag carried by snapshots and baseline envelopes. This registry
/// describes exactly one product's resource surface.
pub const PRODUCT: &str = "swg";

/// Describes one resource type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDef {
    /// Fixed tag stored in the cache and used throughout the engine.
    pub resource_type: &'static str,
    /// HTTP path segment for list/create/update against the remote API.
    pub endpoint: &'static str,
    /// Payload field carrying the remote identifier.
    pub id_field: &'static str,
    /// Payload field used for cross-environment matching.
    pub natural_key: &'static str,
    /// Whether an id missing from a full fetch means the resource was
    /// deleted remotely. False for append-only audit-style types.
    pub deletion_by_absence: bool,
    /// Payload fields holding other resources' identifiers, rewritten
    /// through the identifier map during a push.
    pub reference_fields: &'static [&'static str],
    /// Set for singleton list resources (allowlist/denylist): the
    /// list-valued field that is merged instead of replaced.
    pub merge_field: Option<&'static str>,
}

impl ResourceDef {
    const fn new(resource_type: &'static str, endpoint: &'static str) -> Self {
        Self {
            resource_type,
            endpoint,
            id_field: "id",
            natural_key: "name",
            deletion_by_absence: true,
            reference_fields: &[],
            merge_field: None,
        }
    }

    const fn refs(mut self, fields: &'static [&'static str]) -> Self {
        self.reference_fields = fields;
        self
    }

    const fn merge(mut self, field: &'static str) -> Self {
        self.merge_field = Some(field);
        self
    }

    const fn append_only(mut self) -> Self {
        self.deletion_by_absence = false;
        self
    }

    /// Whether this type is pushed as a merge instead of create/update.
    pub fn is_merge(&self) -> bool {
        self.merge_field.is_some()
    }
}

/// All resource types the import engine mirrors. Order here is irrelevant;
/// push ordering comes from [`PUSH_ORDER`].
pub const RESOURCE_DEFINITIONS: &[ResourceDef] = &[
    ResourceDef::new("rule_label", "ruleLabels"),
    ResourceDef::new("time_interval", "timeWindows"),
    ResourceDef::new("bandwidth_class", "bandwidthClasses"),
    ResourceDef::new("workload_group", "workloadGroups"),
    ResourceDef::new("url_category", "urlCategories"),
    ResourceDef::new("ip_destination_group", "ipDestinationGroups"),
    ResourceDef::new("ip_source_group", "ipSourceGroups"),
    ResourceDef::new("network_service", "networkServices"),
    ResourceDef::new("network_svc_group", "networkServiceGroups").refs(&["services"]),
    ResourceDef::new("dlp_engine", "dlpEngines"),
    ResourceDef::new("dlp_dictionary", "dlpDictionaries"),
    ResourceDef::new("location", "locations"),
    ResourceDef::new("url_filtering_rule", "urlFilteringRules")
        .refs(&["labels", "locations", "timeWindows", "workloadGroups"]),
    ResourceDef::new("firewall_rule", "firewallFilteringRules")
        .refs(&["labels", "locations", "timeWindows", "destIpGroups", "srcIpGroups", "nwServices"]),
    ResourceDef::new("firewall_dns_rule", "firewallDnsRules")
        .refs(&["labels", "locations", "timeWindows", "destIpGroups", "srcIpGroups"]),
    ResourceDef::new("ssl_inspection_rule", "sslInspectionRules")
        .refs(&["labels", "locations", "timeWindows"]),
    ResourceDef::new("nat_control_rule", "natControlRules")
        .refs(&["labels", "locations", "timeWindows", "destIpGroups", "srcIpGroups", "nwServices"]),
    ResourceDef::new("forwarding_rule", "forwardingRules")
        .refs(&["labels", "locations", "destIpGroups", "srcIpGroups", "nwServices"]),
    ResourceDef::new("dlp_web_rule", "webDlpRules")
        .refs(&["labels", "locations", "timeWindows", "dlpEngines", "workloadGroups"]),
    ResourceDef::new("bandwidth_control_rule", "bandwidthControlRules")
        .refs(&["labels", "locations", "timeWindows", "bandwidthClasses"]),
    ResourceDef::new("allowlist", "security/allowlist").merge("allowlistUrls"),
    ResourceDef::new("denylist", "security/denylist").merge("denylistUrls"),
    // Environment-bound inventory: mirrored for visibility, never pushed.
    ResourceDef::new("user", "users"),
    ResourceDef::new("group", "groups"),
    ResourceDef::new("department", "departments"),
    ResourceDef::new("admin_user", "adminUsers").refs(&["role"]),
    ResourceDef::new("admin_role", "adminRoles"),
    ResourceDef::new("location_group", "locationGroups"),
    ResourceDef::new("network_app", "networkApplications"),
    // Append-only activity trail: absence from a fetch never means deletion.
    ResourceDef::new("activity_report", "activityReports").append_only(),
];

/// Dependency-ordered push tiers: referenced objects before the rules that
/// reference them, merge-only singletons last.
pub const PUSH_ORDER: &[&str] = &[
    // Tier 1 — no dependencies
    "rule_label",
    "time_interval",
    "workload_group",
    "bandwidth_class",
    // Tier 2 — grouping objects
    "url_category",
    "ip_destination_group",
    "ip_source_group",
    "network_service",
    "network_svc_group",
    "dlp_engine",
    "dlp_dictionary",
    // Tier 3 — locations
    "location",
    // Tier 4 — rules
    "url_filtering_rule",
    "firewall_rule",
    "firewall_dns_rule",
    "ssl_inspection_rule",
    "nat_control_rule",
    "forwarding_rule",
    "dlp_web_rule",
    "bandwidth_control_rule",
    // Tier 5 — merge-only list singletons
    "allowlist",
    "denylist",
];

/// Environment-specific or read-only types that must never be pushed.
pub const SKIP_TYPES: &[&str] = &[
    "user",
    "group",
    "department",
    "admin_user",
    "admin_role",
    "location_group",
    "network_app",
    "activity_report",
];

/// Types whose predefined/system instances are skipped by content regardless
/// of diff outcome.
pub const SKIP_IF_PREDEFINED: &[&str] = &[
    "url_category",
    "network_service",
    "dlp_engine",
    "dlp_dictionary",
];

/// Known system instance names, for payloads that omit the `predefined` flag.
pub const PREDEFINED_NAMES: &[(&str, &[&str])] = &[
    ("url_category", &["OTHER_ADULT_MATERIAL", "OTHER_BUSINESS_AND_ECONOMY", "ANY"]),
    ("network_service", &["HTTP", "HTTPS", "DNS", "FTP", "SSH", "ICMP_ANY", "ANY"]),
    ("dlp_engine", &["PCI", "HIPAA", "GLBA", "EXTERNAL"]),
    ("dlp_dictionary", &["CREDIT_CARDS", "SSN", "FINANCIAL"]),
];

/// Fields stripped from both sides before any comparison or push.
pub const READONLY_FIELDS: &[&str] = &[
    "id",
    "predefined",
    "lastModifiedBy",
    "lastModifiedTime",
    "lastModifiedByUser",
    "createdBy",
    "creationTime",
    "createdAt",
    "updatedAt",
    "modifiedBy",
    "modifiedTime",
    "isDeleted",
    "deleted",
    "dbCategoryIndex",
];

static BY_TYPE: Lazy<HashMap<&'static str, &'static ResourceDef>> = Lazy::new(|| {
    RESOURCE_DEFINITIONS
        .iter()
        .map(|def| (def.resource_type, def))
        .collect()
});

/// Look up a resource definition by type tag.
pub fn lookup(resource_type: &str) -> Option<&'static ResourceDef> {
    BY_TYPE.get(resource_type).copied()
}

/// All type tags, in definition order.
pub fn all_types() -> Vec<&'static str> {
    RESOURCE_DEFINITIONS.iter().map(|d| d.resource_type).collect()
}

pub fn is_skip_type(resource_type: &str) -> bool {
    SKIP_TYPES.contains(&resource_type)
}

pub fn is_predefined_skip_type(resource_type: &str) -> bool {
    SKIP_IF_PREDEFINED.contains(&resource_type)
}

/// Whether a name is a known system instance of the given type.
pub fn is_known_system_name(resource_type: &str, name: &str) -> bool {
    PREDEFINED_NAMES
        .iter()
        .find(|(t, _)| *t == resource_type)
        .map(|(_, names)| names.contains(&name))
        .unwrap_or(false)
}
