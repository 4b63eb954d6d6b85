//! npm (Node) package statistics.
//!
//! Talks to two endpoints: the registry document at registry.npmjs.org
//! (version manifests plus the parallel `time` map of release timestamps)
//! and the downloads range API at api.npmjs.org. Packages are always
//! scoped, `@author/name`.

use chrono::{NaiveDate, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::error::{Error, Result};
use crate::fetch::Http;

/// One (date, downloads) sample from the downloads range API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadStat {
    pub date: String,
    pub downloads: u64,
}

/// One published version of an npm package, paired with its release
/// timestamp from the registry document's `time` map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageVersion {
    pub version_name: String,
    pub release_date: String,
    /// Back-reference to the owning package, as named in the manifest.
    pub package_name: String,
    /// Raw version manifest from the registry document.
    pub data: Value,
}

#[derive(Deserialize)]
struct RegistryDocument {
    versions: IndexMap<String, Value>,
    /// Release timestamps keyed by version name; also carries the
    /// registry's `created`/`modified` entries, which are ignored.
    time: IndexMap<String, String>,
}

#[derive(Deserialize)]
struct RangeResponse {
    downloads: Vec<RangeEntry>,
}

#[derive(Deserialize)]
struct RangeEntry {
    day: String,
    downloads: u64,
}

fn date_to_str(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn collect_stats(entries: Vec<RangeEntry>) -> Vec<DownloadStat> {
    entries
        .into_iter()
        .map(|entry| DownloadStat {
            date: entry.day,
            downloads: entry.downloads,
        })
        .collect()
}

fn sum_downloads(stats: &[DownloadStat]) -> u64 {
    stats.iter().map(|stat| stat.downloads).sum()
}

/// Pair every entry of the `versions` map with its release timestamp,
/// matched by version-name key rather than position.
fn collect_versions(document: RegistryDocument, context: &str) -> Result<Vec<PackageVersion>> {
    let mut versions = Vec::with_capacity(document.versions.len());
    for (version_name, data) in document.versions {
        let release_date = document.time.get(&version_name).cloned().ok_or_else(|| {
            Error::malformed(context, format!("no release time for version '{version_name}'"))
        })?;
        let package_name = data
            .get("name")
            .and_then(|name| name.as_str())
            .ok_or_else(|| {
                Error::malformed(
                    context,
                    format!("manifest for version '{version_name}' carries no package name"),
                )
            })?
            .to_string();
        versions.push(PackageVersion {
            version_name,
            release_date,
            package_name,
            data,
        });
    }
    Ok(versions)
}

/// Handle for one scoped npm package. Stateless; every accessor issues a
/// fresh API call.
#[derive(Debug, Clone)]
pub struct Package {
    http: Http,
    pub author_name: String,
    pub package_name: String,
}

impl Package {
    pub fn new(author_name: &str, package_name: &str) -> Result<Self> {
        Ok(Self {
            http: Http::new()?,
            author_name: author_name.to_string(),
            package_name: package_name.to_string(),
        })
    }

    /// The scoped `@author/name` identifier used in API paths.
    pub fn package_str(&self) -> String {
        format!("@{}/{}", self.author_name, self.package_name)
    }

    /// All published versions in registry-document order, each paired with
    /// its release timestamp.
    pub async fn versions(&self) -> Result<Vec<PackageVersion>> {
        let url = format!("https://registry.npmjs.org/{}", self.package_str());
        let document: RegistryDocument = self.http.get_json(&url).await?;
        let versions = collect_versions(document, &url)?;
        info!(
            "Retrieved {} versions for '{}'",
            versions.len(),
            self.package_str()
        );
        Ok(versions)
    }

    /// The last entry of the registry's `versions` map, or `None` for a
    /// package with no versions.
    pub async fn latest_version(&self) -> Result<Option<PackageVersion>> {
        let mut versions = self.versions().await?;
        Ok(versions.pop())
    }

    /// Daily download counts between two dates, inclusive.
    ///
    /// Callers are responsible for `start <= end`; an inverted range is
    /// forwarded to the registry as-is, whose behavior is then
    /// authoritative. The range API also rejects or empties windows outside
    /// the registry's retention span.
    pub async fn downloads_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DownloadStat>> {
        let url = format!(
            "https://api.npmjs.org/downloads/range/{}:{}/{}",
            date_to_str(start),
            date_to_str(end),
            self.package_str()
        );
        let response: RangeResponse = self.http.get_json(&url).await?;
        Ok(collect_stats(response.downloads))
    }

    /// Daily download counts from `date` through today.
    pub async fn downloads_since(&self, date: NaiveDate) -> Result<Vec<DownloadStat>> {
        self.downloads_between(date, today()).await
    }

    /// Downloads recorded on a single day, or `None` when the registry has
    /// no entry for that day.
    pub async fn downloads_on(&self, date: NaiveDate) -> Result<Option<DownloadStat>> {
        let stats = self.downloads_between(date, date).await?;
        Ok(stats.into_iter().next())
    }

    /// Downloads in today's bucket so far; zero when the registry has no
    /// entry yet.
    pub async fn downloads_today(&self) -> Result<u64> {
        let stat = self.downloads_on(today()).await?;
        Ok(stat.map(|stat| stat.downloads).unwrap_or(0))
    }

    /// Downloads in yesterday's bucket.
    pub async fn downloads_yesterday(&self) -> Result<u64> {
        let stat = self.downloads_on(today() - chrono::Duration::days(1)).await?;
        Ok(stat.map(|stat| stat.downloads).unwrap_or(0))
    }

    /// Downloads over the trailing 7 days.
    pub async fn downloads_last_week(&self) -> Result<u64> {
        let stats = self.downloads_since(today() - chrono::Duration::days(7)).await?;
        Ok(sum_downloads(&stats))
    }

    /// Downloads over the trailing 30 days.
    pub async fn downloads_last_month(&self) -> Result<u64> {
        let stats = self.downloads_since(today() - chrono::Duration::days(30)).await?;
        Ok(sum_downloads(&stats))
    }

    /// Downloads over the trailing 365 days.
    pub async fn downloads_last_year(&self) -> Result<u64> {
        let stats = self.downloads_since(today() - chrono::Duration::days(365)).await?;
        Ok(sum_downloads(&stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn range_entries_normalize_in_order() {
        let response: RangeResponse = serde_json::from_str(
            r#"{
                "downloads": [
                    {"day": "2024-03-01", "downloads": 10},
                    {"day": "2024-03-02", "downloads": 0},
                    {"day": "2024-03-03", "downloads": 4}
                ]
            }"#,
        )
        .unwrap();

        let stats = collect_stats(response.downloads);

        assert_eq!(stats.len(), 3);
        assert_eq!(stats[0].date, "2024-03-01");
        assert_eq!(stats[0].downloads, 10);
        assert_eq!(stats[2].date, "2024-03-03");
    }

    #[test]
    fn empty_range_normalizes_to_no_stats() {
        assert!(collect_stats(Vec::new()).is_empty());
    }

    #[test]
    fn single_day_range_normalizes_to_one_stat() {
        let response: RangeResponse = serde_json::from_str(
            r#"{"downloads": [{"day": "2024-03-01", "downloads": 10}]}"#,
        )
        .unwrap();

        let stats = collect_stats(response.downloads);

        assert_eq!(stats.len(), 1);
        assert_eq!(stats.into_iter().next().map(|stat| stat.downloads), Some(10));
    }

    #[test]
    fn downloads_sum_over_window() {
        let stats = vec![
            DownloadStat {
                date: "2024-03-01".to_string(),
                downloads: 10,
            },
            DownloadStat {
                date: "2024-03-02".to_string(),
                downloads: 7,
            },
        ];

        assert_eq!(sum_downloads(&stats), 17);
        assert_eq!(sum_downloads(&[]), 0);
    }

    #[test]
    fn versions_pair_release_dates_by_key() -> Result<()> {
        // The time map lists entries in a different order than the versions
        // map and carries the registry's bookkeeping keys; pairing must go
        // through the version-name key, not the position.
        let document: RegistryDocument = serde_json::from_str(
            r#"{
                "versions": {
                    "1.0.0": {"name": "@acme/widget"},
                    "1.1.0": {"name": "@acme/widget"}
                },
                "time": {
                    "created": "2023-01-01T00:00:00.000Z",
                    "1.1.0": "2024-02-01T00:00:00.000Z",
                    "1.0.0": "2023-01-01T00:00:00.000Z",
                    "modified": "2024-02-01T00:00:00.000Z"
                }
            }"#,
        )?;

        let versions = collect_versions(document, "test")?;

        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].version_name, "1.0.0");
        assert_eq!(versions[0].release_date, "2023-01-01T00:00:00.000Z");
        assert_eq!(versions[1].version_name, "1.1.0");
        assert_eq!(versions[1].release_date, "2024-02-01T00:00:00.000Z");
        assert_eq!(versions[1].package_name, "@acme/widget");
        Ok(())
    }

    #[test]
    fn version_without_release_time_is_malformed() -> Result<()> {
        let document: RegistryDocument = serde_json::from_str(
            r#"{
                "versions": {"1.0.0": {"name": "@acme/widget"}},
                "time": {"created": "2023-01-01T00:00:00.000Z"}
            }"#,
        )?;

        let err = collect_versions(document, "test").unwrap_err();
        assert!(matches!(err, Error::MalformedResponse { .. }));
        Ok(())
    }

    #[test]
    fn versions_keep_registry_order() -> Result<()> {
        let document: RegistryDocument = serde_json::from_str(
            r#"{
                "versions": {
                    "0.9.0": {"name": "@acme/widget"},
                    "0.10.0": {"name": "@acme/widget"}
                },
                "time": {
                    "0.9.0": "2022-01-01T00:00:00.000Z",
                    "0.10.0": "2022-06-01T00:00:00.000Z"
                }
            }"#,
        )?;

        let versions = collect_versions(document, "test")?;

        // "0.10.0" sorts before "0.9.0" lexically; document order wins.
        assert_eq!(versions.last().map(|v| v.version_name.as_str()), Some("0.10.0"));
        Ok(())
    }

    #[test]
    fn dates_format_as_ymd() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(date_to_str(date), "2024-03-07");
    }
}
