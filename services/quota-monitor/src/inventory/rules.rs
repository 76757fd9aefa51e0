use std::sync::Arc;

use quota_watch_core::UsageSource;

use super::{InventoryRule, InventoryUsageSource, ResourceFilter, ResourceInventory};

pub const SUPPORTED_SERVICES: &[&str] = &[
    "autoscaling",
    "cloudformation",
    "ec2",
    "elasticbeanstalk",
    "elasticfilesystem",
    "elasticloadbalancing",
    "s3",
    "vpc",
];

const DEDICATED_HOST_FAMILIES: &[(&str, &str)] = &[
    ("L-949445B0", "a1"),
    ("L-E4BF28E0", "c4"),
    ("L-81657574", "c5"),
    ("L-C93F66A2", "c5d"),
    ("L-20F13EBD", "c5n"),
    ("L-8B27377A", "d2"),
    ("L-DE82EABA", "g3"),
    ("L-9675FDCD", "g3s"),
    ("L-CAE24619", "g4dn"),
    ("L-84391ECC", "h1"),
    ("L-6222C1B6", "i2"),
    ("L-77EE2B11", "i3en"),
    ("L-EF30B25E", "m4"),
    ("L-8B7BF662", "m5"),
    ("L-B10F70D6", "m5a"),
    ("L-8CCBD91B", "m5d"),
    ("L-DA07429F", "m5dn"),
    ("L-D50A37FA", "m6g"),
    ("L-2753CF59", "p2"),
    ("L-A0A19F79", "p3"),
    ("L-B7208018", "r3"),
    ("L-313524BA", "r4"),
    ("L-EA4FD6CF", "r5"),
    ("L-8FE30D52", "r5a"),
    ("L-EC7178B6", "r5ad"),
    ("L-8814B54F", "r5d"),
    ("L-4AB14223", "r5dn"),
    ("L-52EF324A", "r5n"),
    ("L-DE3D9563", "x1"),
    ("L-DEF8E115", "x1e"),
    ("L-F035E935", "z1d"),
];

/// Rule table for a service; empty for services without inventory support.
pub fn builtin_rules(service_code: &str) -> Vec<InventoryRule> {
    match service_code {
        "ec2" => ec2_rules(),
        "vpc" => vec![
            InventoryRule::new("L-1B52E74A", "vpc-endpoints")
                .with_filter(ResourceFilter::equals("vpc_endpoint_type", "Gateway")),
            InventoryRule::new("L-29B6F2EB", "vpc-endpoints")
                .with_filter(ResourceFilter::equals("vpc_endpoint_type", "Interface")),
            InventoryRule::new("L-45FE3B85", "egress-only-internet-gateways"),
            InventoryRule::new("L-A4707A72", "internet-gateways"),
            InventoryRule::new("L-B4A6D682", "network-acls"),
            InventoryRule::new("L-DF5E4CA3", "network-interfaces"),
            InventoryRule::new("L-E79EC296", "security-groups"),
            InventoryRule::new("L-F678F1CE", "vpcs"),
        ],
        "elasticloadbalancing" => vec![
            InventoryRule::new("L-E9E9831D", "classic-load-balancers"),
            InventoryRule::new("L-53DA6B97", "load-balancers")
                .with_filter(ResourceFilter::equals("type", "application")),
        ],
        "cloudformation" => vec![
            InventoryRule::new("L-0485CB21", "stacks"),
            InventoryRule::new("L-31709F13", "stack-sets")
                .with_filter(ResourceFilter::equals("status", "ACTIVE")),
        ],
        "autoscaling" => vec![
            InventoryRule::new("L-CDE20ADC", "auto-scaling-groups"),
            InventoryRule::new("L-6B80B8FA", "launch-configurations"),
        ],
        "elasticbeanstalk" => vec![
            InventoryRule::new("L-D64F1F14", "application-versions"),
            InventoryRule::new("L-1CEABD17", "applications"),
            InventoryRule::new("L-8EFC1C51", "environments"),
        ],
        "elasticfilesystem" => vec![InventoryRule::new("L-848C634D", "file-systems")],
        "s3" => vec![
            InventoryRule::new("L-DC2B2D3D", "buckets"),
            InventoryRule::new("L-FAABEEBA", "access-points"),
        ],
        _ => Vec::new(),
    }
}

fn ec2_rules() -> Vec<InventoryRule> {
    let mut rules: Vec<InventoryRule> = DEDICATED_HOST_FAMILIES
        .iter()
        .map(|(quota_code, family)| {
            InventoryRule::new(quota_code, "hosts").with_filter(ResourceFilter::Any(vec![
                ResourceFilter::starts_with("instance_type", &format!("{family}.")),
                ResourceFilter::equals("instance_family", family),
            ]))
        })
        .collect();

    rules.extend([
        InventoryRule::new("L-7029FAB6", "vpn-gateways"),
        InventoryRule::new("L-3E6EC3A3", "vpn-connections"),
        InventoryRule::new("L-A2478D36", "transit-gateways"),
        InventoryRule::new("L-4FB7FF5D", "customer-gateways"),
        InventoryRule::new("L-0263D0A3", "addresses")
            .with_filter(ResourceFilter::equals("domain", "vpc")),
    ]);
    rules
}

/// One usage source per supported service, all sharing `inventory`.
pub fn builtin_sources(inventory: Arc<dyn ResourceInventory>) -> Vec<Arc<dyn UsageSource>> {
    SUPPORTED_SERVICES
        .iter()
        .map(|service_code| {
            Arc::new(InventoryUsageSource::new(
                *service_code,
                builtin_rules(service_code),
                Arc::clone(&inventory),
            )) as Arc<dyn UsageSource>
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::inventory::ResourceRecord;

    #[test]
    fn every_supported_service_has_rules() {
        for service in SUPPORTED_SERVICES {
            assert!(!builtin_rules(service).is_empty(), "{service} has no rules");
        }
        assert!(builtin_rules("lambda").is_empty());
    }

    #[test]
    fn quota_codes_are_unique_per_service() {
        for service in SUPPORTED_SERVICES {
            let rules = builtin_rules(service);
            let codes: BTreeSet<_> = rules.iter().map(|rule| rule.quota_code.as_str()).collect();
            assert_eq!(codes.len(), rules.len(), "{service} repeats a quota code");
        }
    }

    #[test]
    fn dedicated_host_rules_match_family() {
        let rules = builtin_rules("ec2");
        let m5 = rules
            .iter()
            .find(|rule| rule.quota_code == "L-8B7BF662")
            .unwrap();

        assert!(m5.matches(&ResourceRecord::new().with("instance_type", "m5.xlarge")));
        assert!(m5.matches(&ResourceRecord::new().with("instance_family", "m5")));
        assert!(!m5.matches(&ResourceRecord::new().with("instance_type", "m5d.xlarge")));
    }

    #[test]
    fn builtin_sources_cover_supported_services() {
        struct Empty;

        #[async_trait::async_trait]
        impl ResourceInventory for Empty {
            async fn list_resources(
                &self,
                _service_code: &str,
                _kind: &str,
            ) -> anyhow::Result<Vec<ResourceRecord>> {
                Ok(Vec::new())
            }
        }

        let sources = builtin_sources(Arc::new(Empty));
        let codes: Vec<_> = sources.iter().map(|source| source.service_code()).collect();
        assert_eq!(codes, SUPPORTED_SERVICES.to_vec());
    }
}
