//! In-memory user profiles and the balance leaderboard.

use crate::game::constants::START_BALANCE;
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub user_id: i64,
    pub display_name: String,
    pub balance: u32,
}

/// Profiles keyed by user id. First sight of a user grants the starting
/// balance.
#[derive(Default)]
pub struct ProfileRegistry {
    profiles: RwLock<HashMap<i64, Profile>>,
}

impl ProfileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_create(&self, user_id: i64, display_name: &str) -> Profile {
        let mut profiles = self.profiles.write().await;
        profiles
            .entry(user_id)
            .or_insert_with(|| Profile {
                user_id,
                display_name: display_name.to_string(),
                balance: START_BALANCE,
            })
            .clone()
    }

    pub async fn set_display_name(&self, user_id: i64, display_name: &str) {
        let mut profiles = self.profiles.write().await;
        if let Some(profile) = profiles.get_mut(&user_id) {
            profile.display_name = display_name.to_string();
        }
    }

    pub async fn top_balances(&self, limit: usize) -> Vec<Profile> {
        let profiles = self.profiles.read().await;
        let mut all: Vec<Profile> = profiles.values().cloned().collect();
        all.sort_by_key(|p| std::cmp::Reverse(p.balance));
        all.truncate(limit);
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_sight_grants_starting_balance() {
        let registry = ProfileRegistry::new();
        let profile = registry.get_or_create(42, "Ann").await;
        assert_eq!(profile.balance, START_BALANCE);
        assert_eq!(profile.display_name, "Ann");
    }

    #[tokio::test]
    async fn get_or_create_is_stable() {
        let registry = ProfileRegistry::new();
        registry.get_or_create(42, "Ann").await;
        let again = registry.get_or_create(42, "Different").await;
        // An existing profile keeps its name until explicitly renamed.
        assert_eq!(again.display_name, "Ann");
        registry.set_display_name(42, "Anna").await;
        assert_eq!(registry.get_or_create(42, "x").await.display_name, "Anna");
    }

    #[tokio::test]
    async fn top_balances_orders_descending() {
        let registry = ProfileRegistry::new();
        for id in 0..5 {
            registry.get_or_create(id, &format!("p{id}")).await;
        }
        let top = registry.top_balances(3).await;
        assert_eq!(top.len(), 3);
        assert!(top.windows(2).all(|w| w[0].balance >= w[1].balance));
    }
}
