//! PyPI (Python) package statistics.
//!
//! Combines two independent services: pepy.tech, which serves lifetime
//! totals plus a per-date, per-version download map, and pypistats.org,
//! which serves aggregated recent/overall figures and breakdowns by Python
//! version and operating system (filtered server-side via query
//! parameters).

use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::fetch::Http;

/// One (date, downloads) sample derived from the pepy download map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadStat {
    pub date: String,
    pub downloads: u64,
}

/// Per-date download counts, keyed by version within each date.
type DailyVersionDownloads = IndexMap<String, IndexMap<String, u64>>;

#[derive(Deserialize)]
struct PepyProject {
    #[serde(default)]
    total_downloads: u64,
    versions: Vec<String>,
    downloads: DailyVersionDownloads,
}

#[derive(Deserialize)]
struct RecentResponse {
    data: RecentData,
}

#[derive(Debug, Deserialize)]
struct RecentData {
    #[serde(default)]
    last_day: u64,
    #[serde(default)]
    last_week: u64,
    #[serde(default)]
    last_month: u64,
}

#[derive(Deserialize)]
struct SeriesResponse {
    data: Vec<SeriesRow>,
}

#[derive(Deserialize)]
struct SeriesRow {
    date: String,
    #[serde(default)]
    downloads: u64,
}

async fn pepy_project(http: &Http, package_name: &str) -> Result<PepyProject> {
    let url = format!("https://api.pepy.tech/api/v2/projects/{package_name}");
    http.get_json(&url).await
}

async fn pypistats<T: DeserializeOwned>(
    http: &Http,
    package_name: &str,
    endpoint: &str,
    query: &[(&str, &str)],
) -> Result<T> {
    let url = format!("https://pypistats.org/api/packages/{package_name}/{endpoint}");
    http.get_json_with_query(&url, query).await
}

fn date_to_str(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Sum downloads across all versions recorded on each date.
fn daily_totals(downloads: &DailyVersionDownloads) -> Vec<DownloadStat> {
    downloads
        .iter()
        .map(|(date, by_version)| DownloadStat {
            date: date.clone(),
            downloads: by_version.values().sum(),
        })
        .collect()
}

/// The same per-date map filtered down to one version; a date without that
/// version contributes zero.
fn version_series(downloads: &DailyVersionDownloads, version: &str) -> Vec<DownloadStat> {
    downloads
        .iter()
        .map(|(date, by_version)| DownloadStat {
            date: date.clone(),
            downloads: by_version.get(version).copied().unwrap_or(0),
        })
        .collect()
}

fn version_total(downloads: &DailyVersionDownloads, version: &str) -> u64 {
    downloads
        .values()
        .map(|by_version| by_version.get(version).copied().unwrap_or(0))
        .sum()
}

fn downloads_on_date(rows: &[SeriesRow], date: &str) -> u64 {
    rows.iter()
        .find(|row| row.date == date)
        .map(|row| row.downloads)
        .unwrap_or(0)
}

fn sum_series(rows: &[SeriesRow]) -> u64 {
    rows.iter().map(|row| row.downloads).sum()
}

/// Handle for one PyPI package. Stateless; every accessor issues a fresh
/// API call.
#[derive(Debug, Clone)]
pub struct Package {
    http: Http,
    pub package_name: String,
}

impl Package {
    pub fn new(package_name: &str) -> Result<Self> {
        Ok(Self {
            http: Http::new()?,
            package_name: package_name.to_string(),
        })
    }

    /// Cumulative downloads since first publication, as reported by pepy.
    pub async fn downloads_lifetime(&self) -> Result<u64> {
        Ok(pepy_project(&self.http, &self.package_name)
            .await?
            .total_downloads)
    }

    /// All versions pepy knows about, each with its recent download total.
    ///
    /// Issues one additional query per version for its recent figure.
    pub async fn versions(&self) -> Result<Vec<PackageVersion>> {
        let project = pepy_project(&self.http, &self.package_name).await?;
        let mut versions = Vec::with_capacity(project.versions.len());
        for version_name in project.versions {
            let recent_downloads = self
                .recent_total_downloads_for_version(&version_name)
                .await?;
            versions.push(PackageVersion {
                http: self.http.clone(),
                version_name,
                recent_downloads,
                package_name: self.package_name.clone(),
            });
        }
        info!(
            "Retrieved {} versions for '{}'",
            versions.len(),
            self.package_name
        );
        Ok(versions)
    }

    /// Downloads recorded on an exact date in the mirror-less overall
    /// series; zero when the date is absent.
    pub async fn downloads_on(&self, date: NaiveDate) -> Result<u64> {
        let date_str = date_to_str(date);
        let response: SeriesResponse = pypistats(
            &self.http,
            &self.package_name,
            "overall",
            &[("mirrors", "false")],
        )
        .await?;
        Ok(downloads_on_date(&response.data, &date_str))
    }

    async fn recent(&self) -> Result<RecentData> {
        let response: RecentResponse =
            pypistats(&self.http, &self.package_name, "recent", &[]).await?;
        Ok(response.data)
    }

    /// Downloads in yesterday's bucket.
    pub async fn downloads_yesterday(&self) -> Result<u64> {
        Ok(self.recent().await?.last_day)
    }

    /// Downloads over the trailing week.
    pub async fn downloads_last_week(&self) -> Result<u64> {
        Ok(self.recent().await?.last_week)
    }

    /// Downloads over the trailing month.
    pub async fn downloads_last_month(&self) -> Result<u64> {
        Ok(self.recent().await?.last_month)
    }

    /// Per-date download totals summed across all versions.
    pub async fn daily_downloads_totals(&self) -> Result<Vec<DownloadStat>> {
        let project = pepy_project(&self.http, &self.package_name).await?;
        Ok(daily_totals(&project.downloads))
    }

    /// Per-date downloads for a single version; dates without that version
    /// contribute zero.
    pub async fn daily_downloads_for_version(
        &self,
        version_name: &str,
    ) -> Result<Vec<DownloadStat>> {
        let project = pepy_project(&self.http, &self.package_name).await?;
        Ok(version_series(&project.downloads, version_name))
    }

    /// Downloads for a single version summed over pepy's recent window. An
    /// unknown version counts as zero.
    pub async fn recent_total_downloads_for_version(&self, version_name: &str) -> Result<u64> {
        let project = pepy_project(&self.http, &self.package_name).await?;
        Ok(version_total(&project.downloads, version_name))
    }

    /// Recent downloads attributed to one operating system, filtered
    /// server-side.
    pub async fn recent_total_downloads_by_operating_system(
        &self,
        operating_system: &str,
    ) -> Result<u64> {
        let response: SeriesResponse = pypistats(
            &self.http,
            &self.package_name,
            "system",
            &[("os", operating_system)],
        )
        .await?;
        Ok(sum_series(&response.data))
    }

    /// Recent downloads attributed to one minor Python version (for
    /// example `3.11`), filtered server-side.
    pub async fn recent_total_downloads_by_python_version(
        &self,
        python_version: &str,
    ) -> Result<u64> {
        let response: SeriesResponse = pypistats(
            &self.http,
            &self.package_name,
            "python_minor",
            &[("version", python_version)],
        )
        .await?;
        Ok(sum_series(&response.data))
    }

    /// Recent downloads attributed to one major Python version (for
    /// example `3`), filtered server-side.
    pub async fn recent_total_downloads_by_python_major_version(
        &self,
        python_version: &str,
    ) -> Result<u64> {
        let response: SeriesResponse = pypistats(
            &self.http,
            &self.package_name,
            "python_major",
            &[("version", python_version)],
        )
        .await?;
        Ok(sum_series(&response.data))
    }
}

/// One published version of a PyPI package.
#[derive(Debug, Clone)]
pub struct PackageVersion {
    http: Http,
    pub version_name: String,
    /// Downloads for this version over pepy's recent window, captured when
    /// the version list was built.
    pub recent_downloads: u64,
    /// Back-reference to the owning package.
    pub package_name: String,
}

impl PackageVersion {
    /// Per-date downloads recorded for this version.
    pub async fn daily_downloads(&self) -> Result<Vec<DownloadStat>> {
        let project = pepy_project(&self.http, &self.package_name).await?;
        Ok(version_series(&project.downloads, &self.version_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn downloads_from(raw: &str) -> DailyVersionDownloads {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn daily_totals_sum_across_versions() {
        let downloads = downloads_from(r#"{"2024-01-01": {"1.0": 3, "2.0": 2}}"#);

        let stats = daily_totals(&downloads);

        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].date, "2024-01-01");
        assert_eq!(stats[0].downloads, 5);
    }

    #[test]
    fn daily_totals_keep_upstream_date_order() {
        let downloads = downloads_from(
            r#"{
                "2024-01-02": {"1.0": 1},
                "2024-01-01": {"1.0": 2}
            }"#,
        );

        let stats = daily_totals(&downloads);

        assert_eq!(stats[0].date, "2024-01-02");
        assert_eq!(stats[1].date, "2024-01-01");
    }

    #[test]
    fn version_series_fills_missing_dates_with_zero() {
        let downloads = downloads_from(
            r#"{
                "2024-01-01": {"1.0": 3, "2.0": 2},
                "2024-01-02": {"2.0": 8}
            }"#,
        );

        let stats = version_series(&downloads, "1.0");

        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].downloads, 3);
        assert_eq!(stats[1].downloads, 0);
    }

    #[test]
    fn version_total_of_unknown_version_is_zero() {
        let downloads = downloads_from(r#"{"2024-01-01": {"1.0": 3}}"#);

        assert_eq!(version_total(&downloads, "1.0"), 3);
        assert_eq!(version_total(&downloads, "nonexistent"), 0);
    }

    #[test]
    fn downloads_on_date_matches_exactly_or_zero() {
        let response: SeriesResponse = serde_json::from_str(
            r#"{
                "data": [
                    {"category": "without_mirrors", "date": "2024-01-01", "downloads": 42},
                    {"category": "without_mirrors", "date": "2024-01-02", "downloads": 7}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(downloads_on_date(&response.data, "2024-01-02"), 7);
        assert_eq!(downloads_on_date(&response.data, "2024-01-03"), 0);
    }

    #[test]
    fn series_sums_all_rows() {
        let response: SeriesResponse = serde_json::from_str(
            r#"{
                "data": [
                    {"category": "Linux", "date": "2024-01-01", "downloads": 10},
                    {"category": "Linux", "date": "2024-01-02", "downloads": 5}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(sum_series(&response.data), 15);
    }

    #[test]
    fn recent_fields_default_to_zero() {
        let response: RecentResponse =
            serde_json::from_str(r#"{"data": {"last_day": 12}}"#).unwrap();

        assert_eq!(response.data.last_day, 12);
        assert_eq!(response.data.last_week, 0);
        assert_eq!(response.data.last_month, 0);
    }

    #[test]
    fn project_total_defaults_to_zero() {
        let project: PepyProject = serde_json::from_str(
            r#"{"versions": ["1.0"], "downloads": {"2024-01-01": {"1.0": 1}}}"#,
        )
        .unwrap();

        assert_eq!(project.total_downloads, 0);
        assert_eq!(project.versions, vec!["1.0"]);
    }
}
