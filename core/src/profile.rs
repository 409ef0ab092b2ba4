// Session identity and the best-effort profile cache
// The cached and freshly-fetched profiles are kept as two explicit snapshots
// and combined with ProfileFields::merged, so a failed fetch can never erase
// cached fields

use crate::keys;
use crate::store::{KeyValueStore, StoreError};
use serde::{Deserialize, Serialize};

/// Identity fields, all required once a session is authenticated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIdentity {
    pub user_id: String,
    pub phone: String,
    pub auth_token: String,
    /// Carried when present; its absence alone does not force re-authentication
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

/// Best-effort profile cache. Every field may be absent; wallet amounts keep
/// the store's string encoding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fullname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_balance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_amount: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlocked_amount: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kyc_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_blocked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_flags: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_multiplier: Option<String>,
}

impl ProfileFields {
    /// Field-level merge: a field present in `fresh` wins, a field absent in
    /// `fresh` keeps the cached value
    pub fn merged(cached: &Self, fresh: &Self) -> Self {
        Self {
            fullname: fresh.fullname.clone().or_else(|| cached.fullname.clone()),
            avatar_url: fresh.avatar_url.clone().or_else(|| cached.avatar_url.clone()),
            wallet_balance: fresh
                .wallet_balance
                .clone()
                .or_else(|| cached.wallet_balance.clone()),
            locked_amount: fresh
                .locked_amount
                .clone()
                .or_else(|| cached.locked_amount.clone()),
            unlocked_amount: fresh
                .unlocked_amount
                .clone()
                .or_else(|| cached.unlocked_amount.clone()),
            kyc_status: fresh.kyc_status.clone().or_else(|| cached.kyc_status.clone()),
            is_blocked: fresh.is_blocked.or(cached.is_blocked),
            blocked_title: fresh
                .blocked_title
                .clone()
                .or_else(|| cached.blocked_title.clone()),
            blocked_details: fresh
                .blocked_details
                .clone()
                .or_else(|| cached.blocked_details.clone()),
            feature_flags: fresh
                .feature_flags
                .clone()
                .or_else(|| cached.feature_flags.clone()),
            price_multiplier: fresh
                .price_multiplier
                .clone()
                .or_else(|| cached.price_multiplier.clone()),
        }
    }

    /// Read the cached profile from the store; absent keys stay `None`
    pub async fn load(store: &dyn KeyValueStore) -> Result<Self, StoreError> {
        Ok(Self {
            fullname: store.get(keys::FULLNAME).await?,
            avatar_url: store.get(keys::AVATAR_URL).await?,
            wallet_balance: store.get(keys::WALLET_BALANCE).await?,
            locked_amount: store.get(keys::LOCKED_AMOUNT).await?,
            unlocked_amount: store.get(keys::UNLOCKED_AMOUNT).await?,
            kyc_status: store.get(keys::KYC_STATUS).await?,
            is_blocked: store.get(keys::IS_BLOCKED).await?.map(|v| parse_flag(&v)),
            blocked_title: store.get(keys::BLOCKED_TITLE).await?,
            blocked_details: store.get(keys::BLOCKED_DETAILS).await?,
            feature_flags: store.get(keys::FEATURE_FLAGS).await?,
            price_multiplier: store.get(keys::PRICE_MULTIPLIER).await?,
        })
    }

    /// Write every present field through to the store. Absent fields are left
    /// untouched; callers persist merged snapshots, so an absent field here
    /// means "no newer value", not "cleared".
    pub async fn persist(&self, store: &dyn KeyValueStore) -> Result<(), StoreError> {
        for (key, value) in self.string_fields() {
            if let Some(value) = value {
                store.put(key, value).await?;
            }
        }
        if let Some(blocked) = self.is_blocked {
            store
                .put(keys::IS_BLOCKED, if blocked { "true" } else { "false" })
                .await?;
        }
        Ok(())
    }

    fn string_fields(&self) -> [(&'static str, &Option<String>); 10] {
        [
            (keys::FULLNAME, &self.fullname),
            (keys::AVATAR_URL, &self.avatar_url),
            (keys::WALLET_BALANCE, &self.wallet_balance),
            (keys::LOCKED_AMOUNT, &self.locked_amount),
            (keys::UNLOCKED_AMOUNT, &self.unlocked_amount),
            (keys::KYC_STATUS, &self.kyc_status),
            (keys::BLOCKED_TITLE, &self.blocked_title),
            (keys::BLOCKED_DETAILS, &self.blocked_details),
            (keys::FEATURE_FLAGS, &self.feature_flags),
            (keys::PRICE_MULTIPLIER, &self.price_multiplier),
        ]
    }
}

/// Lenient boolean parsing for flag values persisted as strings
fn parse_flag(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}

/// Everything known about the authenticated user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionProfile {
    pub identity: SessionIdentity,
    pub profile: ProfileFields,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn merged_prefers_fresh_fields() {
        let cached = ProfileFields {
            fullname: Some("Old Name".to_string()),
            wallet_balance: Some("100".to_string()),
            ..Default::default()
        };
        let fresh = ProfileFields {
            fullname: Some("New Name".to_string()),
            ..Default::default()
        };

        let merged = ProfileFields::merged(&cached, &fresh);
        assert_eq!(merged.fullname.as_deref(), Some("New Name"));
        // Absent in fresh, so the cached value survives
        assert_eq!(merged.wallet_balance.as_deref(), Some("100"));
    }

    #[test]
    fn merged_of_empty_fresh_is_cached() {
        let cached = ProfileFields {
            kyc_status: Some("verified".to_string()),
            is_blocked: Some(false),
            ..Default::default()
        };

        let merged = ProfileFields::merged(&cached, &ProfileFields::default());
        assert_eq!(merged, cached);
    }

    #[tokio::test]
    async fn load_persist_roundtrip() {
        let store = MemoryStore::new();
        let profile = ProfileFields {
            fullname: Some("A".to_string()),
            avatar_url: Some("https://cdn.example/a.png".to_string()),
            is_blocked: Some(true),
            ..Default::default()
        };

        profile.persist(&store).await.unwrap();

        let loaded = ProfileFields::load(&store).await.unwrap();
        assert_eq!(loaded, profile);
    }

    #[tokio::test]
    async fn load_parses_blocked_flag_leniently() {
        let store = MemoryStore::new();
        store.put(keys::IS_BLOCKED, "1").await.unwrap();
        let loaded = ProfileFields::load(&store).await.unwrap();
        assert_eq!(loaded.is_blocked, Some(true));

        store.put(keys::IS_BLOCKED, "FALSE").await.unwrap();
        let loaded = ProfileFields::load(&store).await.unwrap();
        assert_eq!(loaded.is_blocked, Some(false));
    }

    #[tokio::test]
    async fn persist_leaves_absent_fields_untouched() {
        let store = MemoryStore::new();
        store.put(keys::FULLNAME, "Cached").await.unwrap();

        let update = ProfileFields {
            kyc_status: Some("pending".to_string()),
            ..Default::default()
        };
        update.persist(&store).await.unwrap();

        assert_eq!(
            store.get(keys::FULLNAME).await.unwrap().as_deref(),
            Some("Cached")
        );
        assert_eq!(
            store.get(keys::KYC_STATUS).await.unwrap().as_deref(),
            Some("pending")
        );
    }
}
