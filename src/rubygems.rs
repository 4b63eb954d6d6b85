//! RubyGems package statistics, served by the bestgems.org API.
//!
//! The smallest of the registry modules: four series endpoints mapped
//! through two normalizers (download pairs and ranking pairs). The
//! upstream API exposes no version-level granularity, so none is modeled.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::fetch::Http;

/// One (date, downloads) sample for a gem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadStat {
    pub date: String,
    pub downloads: u64,
}

/// One (date, rank) sample of a gem's popularity ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingStat {
    pub date: String,
    pub rank: u64,
}

#[derive(Deserialize)]
struct DownloadEntry {
    date: String,
    total_downloads: u64,
}

#[derive(Deserialize)]
struct RankingEntry {
    date: String,
    total_ranking: u64,
}

fn collect_download_stats(entries: Vec<DownloadEntry>) -> Vec<DownloadStat> {
    entries
        .into_iter()
        .map(|entry| DownloadStat {
            date: entry.date,
            downloads: entry.total_downloads,
        })
        .collect()
}

fn collect_ranking_stats(entries: Vec<RankingEntry>) -> Vec<RankingStat> {
    entries
        .into_iter()
        .map(|entry| RankingStat {
            date: entry.date,
            rank: entry.total_ranking,
        })
        .collect()
}

/// Handle for one published gem. Stateless; every accessor issues a fresh
/// API call.
#[derive(Debug, Clone)]
pub struct Gem {
    http: Http,
    pub gem_name: String,
}

impl Gem {
    pub fn new(gem_name: &str) -> Result<Self> {
        Ok(Self {
            http: Http::new()?,
            gem_name: gem_name.to_string(),
        })
    }

    fn endpoint_url(&self, endpoint: &str) -> String {
        format!(
            "https://bestgems.org/api/v1/gems/{}/{endpoint}.json",
            self.gem_name
        )
    }

    /// Downloads recorded per day.
    pub async fn daily_downloads(&self) -> Result<Vec<DownloadStat>> {
        let entries: Vec<DownloadEntry> = self
            .http
            .get_json(&self.endpoint_url("daily_downloads"))
            .await?;
        Ok(collect_download_stats(entries))
    }

    /// Cumulative downloads per day.
    pub async fn total_downloads(&self) -> Result<Vec<DownloadStat>> {
        let entries: Vec<DownloadEntry> = self
            .http
            .get_json(&self.endpoint_url("total_downloads"))
            .await?;
        Ok(collect_download_stats(entries))
    }

    /// Daily popularity ranking.
    pub async fn daily_ranking(&self) -> Result<Vec<RankingStat>> {
        let entries: Vec<RankingEntry> = self
            .http
            .get_json(&self.endpoint_url("daily_ranking"))
            .await?;
        Ok(collect_ranking_stats(entries))
    }

    /// Overall popularity ranking per day.
    pub async fn total_ranking(&self) -> Result<Vec<RankingStat>> {
        let entries: Vec<RankingEntry> = self
            .http
            .get_json(&self.endpoint_url("total_ranking"))
            .await?;
        Ok(collect_ranking_stats(entries))
    }
}
