//! Cluster data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tabgraph_core::Tab;

/// Name given to clusters before the naming pass runs.
pub const PLACEHOLDER_NAME: &str = "New Cluster";

/// Cluster colors (the Chrome tab-group palette).
///
/// Assigned round-robin on creation and never reclaimed, so the cycle
/// is deterministic regardless of how many clusters are live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterColor {
    Grey,
    Blue,
    Red,
    Yellow,
    Green,
    Pink,
    Purple,
    Cyan,
    Orange,
}

impl ClusterColor {
    /// The full palette, in assignment order.
    pub const PALETTE: [ClusterColor; 9] = [
        ClusterColor::Grey,
        ClusterColor::Blue,
        ClusterColor::Red,
        ClusterColor::Yellow,
        ClusterColor::Green,
        ClusterColor::Pink,
        ClusterColor::Purple,
        ClusterColor::Cyan,
        ClusterColor::Orange,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterColor::Grey => "grey",
            ClusterColor::Blue => "blue",
            ClusterColor::Red => "red",
            ClusterColor::Yellow => "yellow",
            ClusterColor::Green => "green",
            ClusterColor::Pink => "pink",
            ClusterColor::Purple => "purple",
            ClusterColor::Cyan => "cyan",
            ClusterColor::Orange => "orange",
        }
    }
}

/// A cluster of semantically related tabs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabCluster {
    pub id: String,
    pub name: String,
    pub color: ClusterColor,
    pub tabs: Vec<Tab>,
    /// Entities shared across tabs, ranked by within-cluster frequency.
    pub shared_entities: Vec<String>,
    pub confidence: f32,
    pub created_at: DateTime<Utc>,
    /// Additions since the last rename; removals never touch this.
    pub tabs_added_since_naming: u32,
    /// Mean of entity-name embeddings when available, else of tab
    /// embeddings. `None` when neither exists.
    pub centroid: Option<Vec<f32>>,
    /// Set on membership change, cleared by centroid recomputation.
    #[serde(skip)]
    pub centroid_dirty: bool,
}

impl TabCluster {
    pub fn new(id: String, color: ClusterColor) -> Self {
        Self {
            id,
            name: PLACEHOLDER_NAME.to_string(),
            color,
            tabs: Vec::new(),
            shared_entities: Vec::new(),
            confidence: 1.0,
            created_at: Utc::now(),
            tabs_added_since_naming: 0,
            centroid: None,
            centroid_dirty: true,
        }
    }

    pub fn tab_count(&self) -> usize {
        self.tabs.len()
    }

    /// Add a tab. Idempotent per tab id, so a re-synced batch cannot
    /// create duplicates or inflate the naming counter.
    pub fn add_tab(&mut self, tab: Tab) {
        if self.tabs.iter().any(|t| t.id == tab.id) {
            return;
        }
        self.tabs.push(tab);
        self.tabs_added_since_naming += 1;
        self.centroid_dirty = true;
    }

    /// Remove a tab by id. Returns whether it was present.
    pub fn remove_tab(&mut self, tab_id: i64) -> bool {
        let before = self.tabs.len();
        self.tabs.retain(|t| t.id != tab_id);
        if self.tabs.len() < before {
            self.centroid_dirty = true;
            true
        } else {
            false
        }
    }

    pub fn contains_tab(&self, tab_id: i64) -> bool {
        self.tabs.iter().any(|t| t.id == tab_id)
    }

    pub fn titles(&self) -> Vec<String> {
        self.tabs.iter().map(|t| t.title.clone()).collect()
    }

    /// Whether enough tabs were added to shift the cluster's theme.
    pub fn should_rename(&self, threshold: u32) -> bool {
        self.tabs_added_since_naming >= threshold
    }

    /// Clusters below two tabs are deleted on the next removal.
    pub fn is_undersized(&self) -> bool {
        self.tabs.len() < 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tab(id: i64) -> Tab {
        Tab::new(id, format!("https://t/{}", id), format!("Tab {}", id))
    }

    #[test]
    fn add_tab_is_idempotent() {
        let mut cluster = TabCluster::new("c1".to_string(), ClusterColor::Blue);
        cluster.add_tab(tab(1));
        cluster.add_tab(tab(1));

        assert_eq!(cluster.tab_count(), 1);
        assert_eq!(cluster.tabs_added_since_naming, 1);
    }

    #[test]
    fn remove_tab_reports_presence() {
        let mut cluster = TabCluster::new("c1".to_string(), ClusterColor::Blue);
        cluster.add_tab(tab(1));

        assert!(cluster.remove_tab(1));
        assert!(!cluster.remove_tab(1));
        assert_eq!(cluster.tab_count(), 0);
    }

    #[test]
    fn membership_changes_mark_centroid_dirty() {
        let mut cluster = TabCluster::new("c1".to_string(), ClusterColor::Blue);
        cluster.centroid_dirty = false;
        cluster.add_tab(tab(1));
        assert!(cluster.centroid_dirty);

        cluster.centroid_dirty = false;
        cluster.remove_tab(1);
        assert!(cluster.centroid_dirty);
    }

    #[test]
    fn removals_do_not_touch_naming_counter() {
        let mut cluster = TabCluster::new("c1".to_string(), ClusterColor::Blue);
        cluster.add_tab(tab(1));
        cluster.add_tab(tab(2));
        assert_eq!(cluster.tabs_added_since_naming, 2);

        cluster.remove_tab(2);
        assert_eq!(cluster.tabs_added_since_naming, 2);
        assert!(cluster.should_rename(2));
    }
}
