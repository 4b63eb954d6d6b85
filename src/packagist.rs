//! Packagist (PHP) package statistics.
//!
//! Wraps the public packagist.org JSON API: the package info document plus
//! the download series served under `/stats`. Download series come back as
//! parallel `labels`/`values` arrays; the values side is either a flat
//! array or a map keyed by `vendor/package` or version name.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::error::{Error, Result};
use crate::fetch::Http;

/// Averaging interval for a download series. Upstream treats `daily` as the
/// default when the parameter is omitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interval {
    Daily,
    Weekly,
    Monthly,
}

impl Interval {
    fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }
}

/// One (date, downloads) sample from a Packagist download series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadStat {
    pub date: String,
    pub downloads: u64,
}

#[derive(Deserialize)]
struct InfoResponse {
    package: PackageInfo,
}

#[derive(Deserialize)]
struct PackageInfo {
    versions: IndexMap<String, Value>,
    downloads: DownloadTotals,
}

#[derive(Deserialize)]
struct DownloadTotals {
    daily: u64,
    monthly: u64,
    total: u64,
}

#[derive(Deserialize)]
struct StatsResponse {
    labels: Vec<String>,
    values: StatsValues,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StatsValues {
    Keyed(IndexMap<String, Vec<u64>>),
    Flat(Vec<u64>),
}

async fn info(http: &Http, package: &str) -> Result<PackageInfo> {
    let url = format!("https://packagist.org/packages/{package}.json");
    let response: InfoResponse = http.get_json(&url).await?;
    Ok(response.package)
}

async fn stats(http: &Http, package: &str, interval: Interval) -> Result<StatsResponse> {
    let url = format!("https://packagist.org/packages/{package}/stats/all.json");
    http.get_json_with_query(&url, &[("average", interval.as_str())])
        .await
}

async fn version_stats(
    http: &Http,
    package: &str,
    version: &str,
    interval: Interval,
) -> Result<StatsResponse> {
    let url = format!("https://packagist.org/packages/{package}/stats/{version}.json");
    http.get_json_with_query(&url, &[("average", interval.as_str())])
        .await
}

/// Zip the parallel `labels`/`values` arrays of a stats payload into stat
/// records. `value_key` selects the sub-array when the values side is keyed.
fn collect_stats(
    stats: StatsResponse,
    value_key: Option<&str>,
    context: &str,
) -> Result<Vec<DownloadStat>> {
    let values = match (stats.values, value_key) {
        (StatsValues::Flat(values), _) => values,
        (StatsValues::Keyed(mut map), Some(key)) => map.shift_remove(key).ok_or_else(|| {
            Error::malformed(context, format!("stats values missing key '{key}'"))
        })?,
        (StatsValues::Keyed(_), None) => {
            return Err(Error::malformed(
                context,
                "stats values are keyed but no key was requested",
            ));
        }
    };

    if stats.labels.len() != values.len() {
        return Err(Error::malformed(
            context,
            format!(
                "labels ({}) and values ({}) differ in length",
                stats.labels.len(),
                values.len()
            ),
        ));
    }

    Ok(stats
        .labels
        .into_iter()
        .zip(values)
        .map(|(date, downloads)| DownloadStat { date, downloads })
        .collect())
}

fn collect_versions(info: PackageInfo, http: &Http, context: &str) -> Result<Vec<PackageVersion>> {
    let mut versions = Vec::with_capacity(info.versions.len());
    for (version_name, data) in info.versions {
        let package_name = data
            .get("name")
            .and_then(|name| name.as_str())
            .ok_or_else(|| {
                Error::malformed(
                    context,
                    format!("version '{version_name}' carries no package name"),
                )
            })?
            .to_string();
        versions.push(PackageVersion {
            http: http.clone(),
            version_name,
            package_name,
            data,
        });
    }
    Ok(versions)
}

/// Handle for one Packagist package, identified by vendor and name.
///
/// The handle is stateless: every accessor issues a fresh API call, so two
/// calls can observe different upstream snapshots.
#[derive(Debug, Clone)]
pub struct Package {
    http: Http,
    pub author: String,
    pub name: String,
}

impl Package {
    pub fn new(author: &str, name: &str) -> Result<Self> {
        Ok(Self {
            http: Http::new()?,
            author: author.to_string(),
            name: name.to_string(),
        })
    }

    /// The `vendor/package` identifier used in API paths.
    fn package_str(&self) -> String {
        format!("{}/{}", self.author, self.name)
    }

    /// All published versions, in the order the registry's `versions` map
    /// lists them. That order is an upstream property, not guaranteed to be
    /// chronological.
    pub async fn versions(&self) -> Result<Vec<PackageVersion>> {
        let package = self.package_str();
        let info = info(&self.http, &package).await?;
        let versions = collect_versions(info, &self.http, &package)?;
        info!("Retrieved {} versions for '{}'", versions.len(), package);
        Ok(versions)
    }

    /// The first entry of the registry's `versions` map.
    ///
    /// Packagist happens to list newer versions first, so this is usually
    /// the newest release. It relies entirely on upstream map order and
    /// performs no sorting of its own.
    pub async fn latest_version(&self) -> Result<Option<PackageVersion>> {
        Ok(self.versions().await?.into_iter().next())
    }

    async fn interval_downloads(&self, interval: Interval) -> Result<Vec<DownloadStat>> {
        let package = self.package_str();
        let data = stats(&self.http, &package, interval).await?;
        collect_stats(data, Some(package.as_str()), &package)
    }

    async fn interval_downloads_by_version(
        &self,
        version: &str,
        interval: Interval,
    ) -> Result<Vec<DownloadStat>> {
        let package = self.package_str();
        let data = version_stats(&self.http, &package, version, interval).await?;
        collect_stats(data, Some(version), &package)
    }

    /// Daily download counts for the whole package.
    pub async fn daily_downloads(&self) -> Result<Vec<DownloadStat>> {
        self.interval_downloads(Interval::Daily).await
    }

    /// Daily download counts averaged per week.
    pub async fn average_daily_downloads_weekly(&self) -> Result<Vec<DownloadStat>> {
        self.interval_downloads(Interval::Weekly).await
    }

    /// Daily download counts averaged per month.
    pub async fn average_daily_downloads_monthly(&self) -> Result<Vec<DownloadStat>> {
        self.interval_downloads(Interval::Monthly).await
    }

    /// Average daily downloads over the package lifetime, read straight from
    /// the info payload rather than derived from the series.
    pub async fn average_daily_downloads_lifetime(&self) -> Result<u64> {
        Ok(info(&self.http, &self.package_str()).await?.downloads.daily)
    }

    /// Average monthly downloads over the package lifetime.
    pub async fn average_monthly_downloads_lifetime(&self) -> Result<u64> {
        Ok(info(&self.http, &self.package_str()).await?.downloads.monthly)
    }

    /// Cumulative downloads since first publication.
    pub async fn total_downloads_lifetime(&self) -> Result<u64> {
        Ok(info(&self.http, &self.package_str()).await?.downloads.total)
    }

    /// Daily download counts for a single version.
    pub async fn daily_downloads_by_version(&self, version: &str) -> Result<Vec<DownloadStat>> {
        self.interval_downloads_by_version(version, Interval::Daily)
            .await
    }

    /// Weekly-averaged daily downloads for a single version.
    pub async fn average_daily_downloads_weekly_by_version(
        &self,
        version: &str,
    ) -> Result<Vec<DownloadStat>> {
        self.interval_downloads_by_version(version, Interval::Weekly)
            .await
    }

    /// Monthly-averaged daily downloads for a single version.
    pub async fn average_daily_downloads_monthly_by_version(
        &self,
        version: &str,
    ) -> Result<Vec<DownloadStat>> {
        self.interval_downloads_by_version(version, Interval::Monthly)
            .await
    }
}

/// One published version of a Packagist package.
///
/// Created by [`Package::versions`]; never mutated afterwards. Holds the raw
/// registry payload for the version plus a read-only back-reference to the
/// owning package.
#[derive(Debug, Clone)]
pub struct PackageVersion {
    http: Http,
    pub version_name: String,
    /// `vendor/package` identifier of the owning package.
    pub package_name: String,
    /// Raw version entry from the info document.
    pub data: Value,
}

impl PackageVersion {
    async fn interval_downloads(&self, interval: Interval) -> Result<Vec<DownloadStat>> {
        let data = version_stats(&self.http, &self.package_name, &self.version_name, interval)
            .await?;
        collect_stats(data, Some(self.version_name.as_str()), &self.package_name)
    }

    /// Daily download counts for this version.
    pub async fn daily_downloads(&self) -> Result<Vec<DownloadStat>> {
        self.interval_downloads(Interval::Daily).await
    }

    /// Weekly-averaged daily downloads for this version.
    pub async fn average_daily_downloads_weekly(&self) -> Result<Vec<DownloadStat>> {
        self.interval_downloads(Interval::Weekly).await
    }

    /// Monthly-averaged daily downloads for this version.
    pub async fn average_daily_downloads_monthly(&self) -> Result<Vec<DownloadStat>> {
        self.interval_downloads(Interval::Monthly).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use serde_json::json;

    fn stats_from(value: serde_json::Value) -> StatsResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn flat_values_zip_in_order() -> Result<()> {
        let stats = stats_from(json!({
            "labels": ["2024-01-01", "2024-01-02", "2024-01-03"],
            "values": [5, 0, 12],
        }));

        let collected = collect_stats(stats, None, "test")?;

        assert_eq!(collected.len(), 3);
        assert_eq!(collected[0].date, "2024-01-01");
        assert_eq!(collected[0].downloads, 5);
        assert_eq!(collected[2].date, "2024-01-03");
        assert_eq!(collected[2].downloads, 12);
        Ok(())
    }

    #[test]
    fn keyed_values_match_flat_normalization() -> Result<()> {
        let keyed = stats_from(json!({
            "labels": ["2024-01-01", "2024-01-02"],
            "values": {"monolog/monolog": [7, 9]},
        }));
        let flat = stats_from(json!({
            "labels": ["2024-01-01", "2024-01-02"],
            "values": [7, 9],
        }));

        let from_keyed = collect_stats(keyed, Some("monolog/monolog"), "test")?;
        let from_flat = collect_stats(flat, None, "test")?;

        assert_eq!(from_keyed, from_flat);
        Ok(())
    }

    #[test]
    fn missing_value_key_is_malformed() {
        let stats = stats_from(json!({
            "labels": ["2024-01-01"],
            "values": {"1.0.0": [3]},
        }));

        let err = collect_stats(stats, Some("2.0.0"), "test").unwrap_err();
        assert!(matches!(err, Error::MalformedResponse { .. }));
    }

    #[test]
    fn mismatched_lengths_are_malformed() {
        let stats = stats_from(json!({
            "labels": ["2024-01-01", "2024-01-02"],
            "values": [4],
        }));

        let err = collect_stats(stats, None, "test").unwrap_err();
        assert!(matches!(err, Error::MalformedResponse { .. }));
    }

    #[test]
    fn repeated_normalization_is_structurally_equal() -> Result<()> {
        let payload = json!({
            "labels": ["2024-01-01", "2024-01-02"],
            "values": {"a/b": [1, 2]},
        });

        let first = collect_stats(stats_from(payload.clone()), Some("a/b"), "test")?;
        let second = collect_stats(stats_from(payload), Some("a/b"), "test")?;

        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn versions_keep_upstream_map_order() -> Result<()> {
        // Parsed from text so the map order survives; the 2.x entry comes
        // first even though it sorts after 1.x.
        let response: InfoResponse = serde_json::from_str(
            r#"{
                "package": {
                    "versions": {
                        "2.0.0": {"name": "acme/widget"},
                        "1.0.0": {"name": "acme/widget"}
                    },
                    "downloads": {"daily": 10, "monthly": 300, "total": 9000}
                }
            }"#,
        )?;

        let http = Http::new()?;
        let versions = collect_versions(response.package, &http, "test")?;

        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].version_name, "2.0.0");
        assert_eq!(versions[1].version_name, "1.0.0");
        assert_eq!(versions[0].package_name, "acme/widget");
        Ok(())
    }

    #[test]
    fn version_without_package_name_is_malformed() -> Result<()> {
        let response: InfoResponse = serde_json::from_str(
            r#"{
                "package": {
                    "versions": {"1.0.0": {}},
                    "downloads": {"daily": 0, "monthly": 0, "total": 0}
                }
            }"#,
        )?;

        let http = Http::new()?;
        let err = collect_versions(response.package, &http, "test").unwrap_err();
        assert!(matches!(err, Error::MalformedResponse { .. }));
        Ok(())
    }
}
