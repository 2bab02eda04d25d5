//! Bucket name resolution.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use kube::ResourceExt;
use quobject_model::QuObjectBucketClaim;
use rand::RngExt;

/// Length of a generated suffix.
pub const SUFFIX_LEN: usize = 5;

const ALPHABET: &[u8; 36] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Largest multiple of the alphabet size that fits in a byte. Bytes at or
/// above it are rejected so every symbol is equally likely.
const REJECT_FROM: u8 = 252;

/// Source of generated bucket-name suffixes.
pub trait SuffixSource: Send + Sync + fmt::Debug {
    /// A fresh suffix of [`SUFFIX_LEN`] lowercase alphanumeric characters.
    fn suffix(&self) -> String;
}

/// Suffixes drawn from the thread-local CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomSuffix;

impl SuffixSource for RandomSuffix {
    fn suffix(&self) -> String {
        let mut rng = rand::rng();
        let mut out = String::with_capacity(SUFFIX_LEN);
        let mut buf = [0u8; 16];
        while out.len() < SUFFIX_LEN {
            rng.fill(&mut buf);
            for b in buf.iter().copied().filter(|b| *b < REJECT_FROM) {
                out.push(char::from(ALPHABET[usize::from(b % 36)]));
                if out.len() == SUFFIX_LEN {
                    break;
                }
            }
        }
        out
    }
}

/// Always returns the same suffix and counts how often it was asked.
#[derive(Debug)]
pub struct FixedSuffix {
    suffix: String,
    draws: AtomicUsize,
}

impl FixedSuffix {
    /// Source returning `suffix` on every draw.
    #[must_use]
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
            draws: AtomicUsize::new(0),
        }
    }

    /// Number of suffixes handed out so far.
    #[must_use]
    pub fn draws(&self) -> usize {
        self.draws.load(Ordering::Relaxed)
    }
}

impl SuffixSource for FixedSuffix {
    fn suffix(&self) -> String {
        self.draws.fetch_add(1, Ordering::Relaxed);
        self.suffix.clone()
    }
}

/// Derives the bucket name for a claim.
///
/// First match wins:
///
/// 1. `spec.bucketName`
/// 2. `status.bucketName` from an earlier pass
/// 3. `{spec.generateBucketName}-{suffix}`
/// 4. `{namespace}-{name}-{suffix}`
///
/// Rule 2 keeps a generated name stable: once it is recorded in the status no
/// new suffix is ever drawn for the claim.
#[derive(Debug, Clone)]
pub struct NameResolver {
    suffixes: Arc<dyn SuffixSource>,
}

impl Default for NameResolver {
    fn default() -> Self {
        Self::new(Arc::new(RandomSuffix))
    }
}

impl NameResolver {
    /// Resolver drawing suffixes from `suffixes`.
    #[must_use]
    pub fn new(suffixes: Arc<dyn SuffixSource>) -> Self {
        Self { suffixes }
    }

    /// Resolve the bucket name for `claim`.
    #[must_use]
    pub fn resolve(&self, claim: &QuObjectBucketClaim) -> String {
        if let Some(name) = claim.spec.explicit_bucket_name() {
            return name.to_owned();
        }
        if let Some(name) = claim.status_bucket_name() {
            return name.to_owned();
        }

        let suffix = self.suffixes.suffix();
        match claim.spec.name_prefix() {
            Some(prefix) => format!("{prefix}-{suffix}"),
            None => format!(
                "{}-{}-{suffix}",
                claim.namespace().unwrap_or_default(),
                claim.name_any()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use quobject_model::{QuObjectBucketClaimSpec, QuObjectBucketClaimStatus};

    use super::*;

    fn claim(spec: QuObjectBucketClaimSpec) -> QuObjectBucketClaim {
        let mut claim = QuObjectBucketClaim::new("a", spec);
        claim.metadata.namespace = Some("ns".to_owned());
        claim
    }

    fn with_status_name(mut claim: QuObjectBucketClaim, name: &str) -> QuObjectBucketClaim {
        claim.status = Some(QuObjectBucketClaimStatus {
            bucket_name: Some(name.to_owned()),
            ..Default::default()
        });
        claim
    }

    fn is_generated(name: &str, prefix: &str) -> bool {
        name.strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('-'))
            .is_some_and(|suffix| {
                suffix.len() == SUFFIX_LEN
                    && suffix
                        .bytes()
                        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
            })
    }

    #[test]
    fn test_should_prefer_explicit_name_over_everything() {
        let source = Arc::new(FixedSuffix::new("zzzzz"));
        let resolver = NameResolver::new(source.clone());
        let spec = QuObjectBucketClaimSpec {
            bucket_name: Some("X".to_owned()),
            generate_bucket_name: Some("p".to_owned()),
            ..Default::default()
        };

        assert_eq!(resolver.resolve(&claim(spec.clone())), "X");
        assert_eq!(resolver.resolve(&with_status_name(claim(spec), "old")), "X");
        assert_eq!(source.draws(), 0);
    }

    #[test]
    fn test_should_reuse_status_name() {
        let source = Arc::new(FixedSuffix::new("zzzzz"));
        let resolver = NameResolver::new(source.clone());
        let spec = QuObjectBucketClaimSpec {
            generate_bucket_name: Some("changed".to_owned()),
            ..Default::default()
        };

        let resolved = resolver.resolve(&with_status_name(claim(spec), "app-k3x9q"));
        assert_eq!(resolved, "app-k3x9q");
        assert_eq!(source.draws(), 0);
    }

    #[test]
    fn test_should_generate_from_prefix() {
        let resolver = NameResolver::default();
        let spec = QuObjectBucketClaimSpec {
            generate_bucket_name: Some("app".to_owned()),
            ..Default::default()
        };
        let name = resolver.resolve(&claim(spec));
        assert!(is_generated(&name, "app"), "{name}");
    }

    #[test]
    fn test_should_fall_back_to_namespace_and_name() {
        let resolver = NameResolver::new(Arc::new(FixedSuffix::new("abc12")));
        assert_eq!(
            resolver.resolve(&claim(QuObjectBucketClaimSpec::default())),
            "ns-a-abc12"
        );
    }

    #[test]
    fn test_should_treat_empty_strings_as_absent() {
        let resolver = NameResolver::new(Arc::new(FixedSuffix::new("abc12")));
        let spec = QuObjectBucketClaimSpec {
            bucket_name: Some(String::new()),
            generate_bucket_name: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(
            resolver.resolve(&with_status_name(claim(spec), "")),
            "ns-a-abc12"
        );
    }

    #[test]
    fn test_should_draw_suffixes_from_alphabet() {
        for _ in 0..200 {
            let suffix = RandomSuffix.suffix();
            assert_eq!(suffix.len(), SUFFIX_LEN);
            assert!(suffix.bytes().all(|b| ALPHABET.contains(&b)), "{suffix}");
        }
    }
}
