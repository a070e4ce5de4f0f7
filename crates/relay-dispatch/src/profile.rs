use std::collections::HashMap;
use std::sync::Arc;

use relay_core::ProfileInfo;
use relay_source::PacedSource;
use tracing::{debug, warn};

/// Run-scoped memo of sender display metadata.
///
/// Successful lookups are kept for the rest of the run and never refreshed.
/// Failed lookups return [`ProfileInfo::fallback`] without caching it, so the
/// next message from the same sender tries again.
pub struct ProfileCache {
    source: Arc<PacedSource>,
    entries: HashMap<String, ProfileInfo>,
}

impl ProfileCache {
    pub fn new(source: Arc<PacedSource>) -> Self {
        Self {
            source,
            entries: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub async fn resolve(&mut self, sender_id: &str) -> ProfileInfo {
        if let Some(cached) = self.entries.get(sender_id) {
            return cached.clone();
        }

        match self.lookup(sender_id).await {
            Some(profile) => {
                debug!(sender_id, name = %profile.name, "profile cached");
                self.entries.insert(sender_id.to_string(), profile.clone());
                profile
            }
            None => ProfileInfo::fallback(sender_id),
        }
    }

    async fn lookup(&self, sender_id: &str) -> Option<ProfileInfo> {
        let info = match self.source.user_info(sender_id).await {
            Ok(info) => info,
            Err(e) => {
                warn!(sender_id, error = %e, "profile lookup failed");
                return None;
            }
        };
        if !info.ok {
            warn!(
                sender_id,
                error = info.error.as_deref().unwrap_or("unknown"),
                "profile lookup rejected"
            );
            return None;
        }

        let Some(profile) = info.user.and_then(|u| u.profile) else {
            warn!(sender_id, "profile lookup returned no profile");
            return None;
        };
        let name = profile.real_name.unwrap_or_default();
        let handle = match profile.display_name {
            Some(display) if !display.is_empty() => display,
            _ => name.clone(),
        };
        Some(ProfileInfo {
            name,
            handle,
            avatar: profile.image_original.filter(|a| !a.is_empty()),
        })
    }
}
