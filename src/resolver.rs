use crate::cache::SkinCache;
use crate::codec::{self, SkinBitmap};
use crate::default_skin::default_skin;
use crate::upstream::{CanonicalUser, ProfileLookup, SkinStore};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionOutcome {
    /// The bitmap belongs to a real player (disk cache or remote).
    Resolved,
    /// No real skin was found and the default skin was substituted.
    Fallback,
}

impl ResolutionOutcome {
    pub fn result_label(&self) -> &'static str {
        match self {
            Self::Resolved => "ok",
            Self::Fallback => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkinSource {
    DiskCache,
    SkinStore,
    Profile,
    Default,
}

impl SkinSource {
    pub fn label(&self) -> &'static str {
        match self {
            Self::DiskCache => "cache",
            Self::SkinStore => "store",
            Self::Profile => "profile",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedSkin {
    pub bitmap: SkinBitmap,
    pub outcome: ResolutionOutcome,
    pub source: SkinSource,
}

enum ResolveStep {
    CheckCache,
    FetchByName,
    LookupProfile,
    FetchByProfile(CanonicalUser),
    Persist {
        key: String,
        bytes: Bytes,
        bitmap: SkinBitmap,
        source: SkinSource,
    },
    Done(ResolvedSkin),
}

/// Walks cache -> skin store -> profile lookup -> skin store again -> default
/// skin. Never fails: every remote or cache problem ends in a fallback.
#[derive(Clone)]
pub struct SkinResolver {
    cache: SkinCache,
    skins: Arc<dyn SkinStore>,
    profiles: Arc<dyn ProfileLookup>,
}

impl SkinResolver {
    pub fn new(
        cache: SkinCache,
        skins: Arc<dyn SkinStore>,
        profiles: Arc<dyn ProfileLookup>,
    ) -> Self {
        Self {
            cache,
            skins,
            profiles,
        }
    }

    pub async fn resolve(&self, identifier: &str) -> ResolvedSkin {
        let mut step = ResolveStep::CheckCache;
        loop {
            step = match step {
                ResolveStep::CheckCache => self.check_cache(identifier).await,
                ResolveStep::FetchByName => self.fetch_by_name(identifier).await,
                ResolveStep::LookupProfile => self.lookup_profile(identifier).await,
                ResolveStep::FetchByProfile(user) => self.fetch_by_profile(identifier, user).await,
                ResolveStep::Persist {
                    key,
                    bytes,
                    bitmap,
                    source,
                } => self.persist(key, bytes, bitmap, source).await,
                ResolveStep::Done(resolved) => {
                    debug!(
                        identifier = %identifier,
                        outcome = resolved.outcome.result_label(),
                        source = resolved.source.label(),
                        "skin resolved"
                    );
                    return resolved;
                }
            };
        }
    }

    async fn check_cache(&self, identifier: &str) -> ResolveStep {
        let Some(bytes) = self.cache.load(identifier).await else {
            return ResolveStep::FetchByName;
        };
        match codec::decode_skin(&bytes) {
            Ok(bitmap) => ResolveStep::Done(ResolvedSkin {
                bitmap,
                outcome: ResolutionOutcome::Resolved,
                source: SkinSource::DiskCache,
            }),
            Err(err) => {
                warn!(identifier = %identifier, error = %err, "cached skin unreadable, refetching");
                ResolveStep::FetchByName
            }
        }
    }

    async fn fetch_by_name(&self, identifier: &str) -> ResolveStep {
        match self.fetch_decoded(identifier).await {
            Some((bytes, bitmap)) => ResolveStep::Persist {
                key: identifier.to_string(),
                bytes,
                bitmap,
                source: SkinSource::SkinStore,
            },
            None => ResolveStep::LookupProfile,
        }
    }

    async fn lookup_profile(&self, identifier: &str) -> ResolveStep {
        match self.profiles.resolve_user(identifier).await {
            Ok(user) => ResolveStep::FetchByProfile(user),
            Err(err) => {
                if !err.is_not_found() {
                    warn!(identifier = %identifier, error = %err, "profile lookup failed");
                }
                fallback()
            }
        }
    }

    async fn fetch_by_profile(&self, identifier: &str, user: CanonicalUser) -> ResolveStep {
        debug!(
            identifier = %identifier,
            canonical_name = %user.name,
            canonical_id = %user.canonical_id,
            "retrying skin fetch with canonical name"
        );
        match self.fetch_decoded(&user.name).await {
            Some((bytes, bitmap)) => ResolveStep::Persist {
                key: user.name,
                bytes,
                bitmap,
                source: SkinSource::Profile,
            },
            None => fallback(),
        }
    }

    async fn persist(
        &self,
        key: String,
        bytes: Bytes,
        bitmap: SkinBitmap,
        source: SkinSource,
    ) -> ResolveStep {
        if self.cache.is_enabled() {
            if let Err(err) = self.cache.store(&key, &bytes).await {
                warn!(key = %key, error = ?err, "skin cache write failed");
            }
        }
        ResolveStep::Done(ResolvedSkin {
            bitmap,
            outcome: ResolutionOutcome::Resolved,
            source,
        })
    }

    async fn fetch_decoded(&self, name: &str) -> Option<(Bytes, SkinBitmap)> {
        let bytes = match self.skins.fetch_skin(name).await {
            Ok(bytes) => bytes,
            Err(err) => {
                if !err.is_not_found() {
                    warn!(name = %name, error = %err, "skin fetch failed");
                }
                return None;
            }
        };
        match codec::decode_skin(&bytes) {
            Ok(bitmap) => Some((bytes, bitmap)),
            Err(err) => {
                warn!(name = %name, error = %err, "skin store returned an unusable image");
                None
            }
        }
    }
}

fn fallback() -> ResolveStep {
    ResolveStep::Done(ResolvedSkin {
        bitmap: default_skin(),
        outcome: ResolutionOutcome::Fallback,
        source: SkinSource::Default,
    })
}
