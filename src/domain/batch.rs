//! Partitioning of the new-domain list into certificate-sized batches.
//!
//! A managed certificate has a maximum number of domains, so the domain list is cut
//! into consecutive chunks of at most `chunk_size` entries and chunk `i` is owned by
//! `certificate_names[i]`. Every per-domain list (authorization self links, map entry
//! names) is sliced with the same bounds so the batches stay aligned.

use super::names::Domain;
use super::resources::ResourcePaths;
use crate::errors::{Result, RotatorError};
use std::ops::Range;

/// One certificate and everything bound to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub certificate_name: String,
    pub domains: Vec<Domain>,
    /// Short authorization ids, one per domain
    pub authorization_names: Vec<String>,
    /// Full authorization resource names, one per domain
    pub authorization_self_links: Vec<String>,
    pub map_entry_names: Vec<String>,
}

impl Batch {
    /// `(domain, map entry name)` pairs in batch order
    pub fn entries(&self) -> impl Iterator<Item = (&Domain, &str)> {
        self.domains.iter().zip(self.map_entry_names.iter().map(String::as_str))
    }
}

/// The full set of batches for one rotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    batches: Vec<Batch>,
}

impl BatchPlan {
    /// Partition `domains` into batches of at most `chunk_size`.
    ///
    /// Fails with a configuration error when `chunk_size` is zero, when there are no
    /// domains, or when the number of certificate names differs from the number of
    /// batches.
    pub fn new(
        domains: &[Domain],
        certificate_names: &[String],
        chunk_size: usize,
        paths: &ResourcePaths,
    ) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RotatorError::config("chunk size must be at least 1"));
        }
        if domains.is_empty() {
            return Err(RotatorError::config("at least one domain is required"));
        }

        let bounds = chunk_bounds(domains.len(), chunk_size);
        if certificate_names.len() != bounds.len() {
            return Err(RotatorError::config(format!(
                "{} domains in chunks of {} need {} certificate names, got {}",
                domains.len(),
                chunk_size,
                bounds.len(),
                certificate_names.len()
            )));
        }

        let authorization_names: Vec<String> = domains.iter().map(Domain::slug).collect();
        let authorization_self_links: Vec<String> =
            authorization_names.iter().map(|name| paths.authorization(name)).collect();
        let map_entry_names: Vec<String> = domains.iter().map(Domain::slug).collect();

        let batches = bounds
            .into_iter()
            .zip(certificate_names)
            .map(|(range, certificate_name)| Batch {
                certificate_name: certificate_name.clone(),
                domains: domains[range.clone()].to_vec(),
                authorization_names: authorization_names[range.clone()].to_vec(),
                authorization_self_links: authorization_self_links[range.clone()].to_vec(),
                map_entry_names: map_entry_names[range].to_vec(),
            })
            .collect();

        Ok(Self { batches })
    }

    pub fn batches(&self) -> &[Batch] {
        &self.batches
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Every new domain, in input order
    pub fn domains(&self) -> impl Iterator<Item = &Domain> {
        self.batches.iter().flat_map(|batch| batch.domains.iter())
    }

    pub fn certificate_names(&self) -> Vec<String> {
        self.batches.iter().map(|batch| batch.certificate_name.clone()).collect()
    }

    pub fn authorization_names(&self) -> Vec<String> {
        self.batches.iter().flat_map(|batch| batch.authorization_names.iter().cloned()).collect()
    }

    pub fn map_entry_names(&self) -> Vec<String> {
        self.batches.iter().flat_map(|batch| batch.map_entry_names.iter().cloned()).collect()
    }
}

/// Half-open index ranges `[i*C, min((i+1)*C, n))`.
fn chunk_bounds(len: usize, chunk_size: usize) -> Vec<Range<usize>> {
    (0..len).step_by(chunk_size).map(|start| start..(start + chunk_size).min(len)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn domains(names: &[&str]) -> Vec<Domain> {
        names.iter().map(|name| Domain::parse(name).unwrap()).collect()
    }

    fn paths() -> ResourcePaths {
        ResourcePaths::new("acme-prod", "global")
    }

    #[test]
    fn test_three_domains_two_certificates() {
        let plan = BatchPlan::new(
            &domains(&["a.example.com", "b.example.com", "c.example.com"]),
            &["cert-0".to_string(), "cert-1".to_string()],
            2,
            &paths(),
        )
        .unwrap();

        assert_eq!(plan.len(), 2);
        let first = &plan.batches()[0];
        assert_eq!(first.certificate_name, "cert-0");
        assert_eq!(first.domains, domains(&["a.example.com", "b.example.com"]));
        assert_eq!(first.map_entry_names, vec!["a-example-com", "b-example-com"]);
        assert_eq!(
            first.authorization_self_links[1],
            "projects/acme-prod/locations/global/dnsAuthorizations/b-example-com"
        );

        let second = &plan.batches()[1];
        assert_eq!(second.certificate_name, "cert-1");
        assert_eq!(second.domains, domains(&["c.example.com"]));
        assert_eq!(second.authorization_names, vec!["c-example-com"]);
    }

    #[test]
    fn test_mismatched_certificate_count() {
        let err = BatchPlan::new(
            &domains(&["a.example.com", "b.example.com", "c.example.com"]),
            &["cert-0".to_string()],
            2,
            &paths(),
        )
        .unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("need 2 certificate names, got 1"));
    }

    #[test]
    fn test_zero_chunk_size() {
        let err = BatchPlan::new(&domains(&["a.example.com"]), &[], 0, &paths()).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_empty_domains() {
        let err = BatchPlan::new(&[], &[], 2, &paths()).unwrap_err();
        assert!(err.is_config());
    }

    proptest! {
        #[test]
        fn prop_batches_reconstruct_input(n in 1usize..60, chunk in 1usize..12) {
            let input: Vec<Domain> = (0..n)
                .map(|i| Domain::parse(&format!("host{}.example.com", i)).unwrap())
                .collect();
            let expected = n.div_ceil(chunk);
            let names: Vec<String> = (0..expected).map(|i| format!("cert-{}", i)).collect();

            let plan = BatchPlan::new(&input, &names, chunk, &paths()).unwrap();

            prop_assert_eq!(plan.len(), expected);
            for batch in plan.batches() {
                prop_assert!(batch.domains.len() <= chunk);
                prop_assert_eq!(batch.domains.len(), batch.authorization_self_links.len());
                prop_assert_eq!(batch.domains.len(), batch.map_entry_names.len());
            }
            let rebuilt: Vec<Domain> = plan.domains().cloned().collect();
            prop_assert_eq!(rebuilt, input);
        }
    }
}
