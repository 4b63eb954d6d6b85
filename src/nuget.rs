//! NuGet (.NET) package statistics.
//!
//! Combines two unrelated upstream surfaces: the Azure Search API, which
//! carries authoritative lifetime download totals per version, and the
//! nuget.org stats reports, which cover a recent window (roughly the last
//! six weeks) and can be grouped by version and/or client version. The
//! report format is backed by an HTML report generator and is known to be
//! flaky; numeric cells that fail to parse count as zero.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::fetch::Http;

/// Download totals attributed to one NuGet client version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageClient {
    pub client_version: String,
    pub total_downloads: u64,
}

/// One published version of a NuGet package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageVersion {
    /// Back-reference to the owning package.
    pub package_name: String,
    pub version: String,
    pub total_downloads: u64,
    /// Client versions that downloaded this version, populated only by
    /// [`Package::detailed_versions`].
    pub clients: Vec<PackageClient>,
}

#[derive(Deserialize)]
struct SearchResponse {
    data: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    #[serde(default)]
    versions: Vec<SearchVersion>,
}

#[derive(Deserialize)]
struct SearchVersion {
    version: String,
    downloads: u64,
}

#[derive(Deserialize)]
struct ReportResponse {
    #[serde(rename = "Table")]
    table: Vec<ReportRow>,
}

type ReportRow = Vec<Option<ReportCell>>;

#[derive(Deserialize)]
struct ReportCell {
    #[serde(rename = "Data")]
    data: String,
}

async fn search(http: &Http, package_name: &str) -> Result<SearchResponse> {
    let url = format!(
        "https://azuresearch-usnc.nuget.org/query?q={}&prerelease=false",
        urlencoding::encode(package_name)
    );
    http.get_json(&url).await
}

async fn stats_report(http: &Http, package_name: &str, group_by: &[&str]) -> Result<ReportResponse> {
    let url = format!("https://www.nuget.org/stats/reports/packages/{package_name}");
    let query: Vec<(&str, &str)> = group_by.iter().map(|group| ("groupBy", *group)).collect();
    http.get_json_with_query(&url, &query).await
}

/// Parse a numeric report cell. Non-numeric placeholders ("N/A", empty
/// strings) count as zero; this never fails.
fn parse_count(raw: &str) -> u64 {
    raw.trim().parse().unwrap_or(0)
}

fn cell_text(row: &ReportRow, index: usize) -> Option<&str> {
    row.get(index)
        .and_then(|cell| cell.as_ref())
        .map(|cell| cell.data.as_str())
}

fn cell_count(row: &ReportRow, index: usize) -> u64 {
    cell_text(row, index).map(parse_count).unwrap_or(0)
}

fn require_cell_text<'a>(row: &'a ReportRow, index: usize, context: &str) -> Result<&'a str> {
    cell_text(row, index)
        .ok_or_else(|| Error::malformed(context, format!("report row missing cell {index}")))
}

fn client_from_row(row: &ReportRow, context: &str) -> Result<PackageClient> {
    Ok(PackageClient {
        client_version: require_cell_text(row, 1, context)?.to_string(),
        total_downloads: cell_count(row, 2),
    })
}

/// Collect the client rows belonging to `version` from a report grouped by
/// client version and version.
///
/// The report emits rows in version-contiguous blocks: the first row of a
/// block names the version, continuation rows leave the first cell null.
/// That layout is an upstream contract this scan does not re-verify; if it
/// is ever violated, clients are silently attributed to the wrong version.
fn clients_for_version(
    table: &[ReportRow],
    version: &str,
    context: &str,
) -> Result<Vec<PackageClient>> {
    let mut clients = Vec::new();
    let mut rows = table.iter();

    for row in rows.by_ref() {
        if cell_text(row, 0) == Some(version) {
            clients.push(client_from_row(row, context)?);
            break;
        }
    }
    for row in rows {
        if cell_text(row, 0).is_some() {
            break;
        }
        clients.push(client_from_row(row, context)?);
    }

    Ok(clients)
}

fn version_downloads(versions: &[PackageVersion], version: &str) -> u64 {
    versions
        .iter()
        .find(|entry| entry.version == version)
        .map(|entry| entry.total_downloads)
        .unwrap_or(0)
}

fn client_downloads(clients: &[PackageClient], client: &str) -> u64 {
    clients
        .iter()
        .find(|entry| entry.client_version == client)
        .map(|entry| entry.total_downloads)
        .unwrap_or(0)
}

/// Handle for one NuGet package. Stateless; every accessor re-queries the
/// upstream APIs.
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

    /// All versions with their lifetime download totals, from the first hit
    /// of the search API.
    pub async fn versions(&self) -> Result<Vec<PackageVersion>> {
        let response = search(&self.http, &self.package_name).await?;
        let hit = response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| Error::malformed(&self.package_name, "search returned no packages"))?;

        let versions: Vec<PackageVersion> = hit
            .versions
            .into_iter()
            .map(|entry| PackageVersion {
                package_name: self.package_name.clone(),
                version: entry.version,
                total_downloads: entry.downloads,
                clients: Vec::new(),
            })
            .collect();

        info!(
            "Retrieved {} versions for '{}'",
            versions.len(),
            self.package_name
        );
        Ok(versions)
    }

    /// The last entry of the search API's version list, or `None` for a
    /// package with no versions.
    pub async fn latest_version(&self) -> Result<Option<PackageVersion>> {
        let mut versions = self.versions().await?;
        Ok(versions.pop())
    }

    /// Recent-window client breakdown for the whole package.
    pub async fn clients(&self) -> Result<Vec<PackageClient>> {
        let report = stats_report(&self.http, &self.package_name, &["ClientVersion"]).await?;
        report
            .table
            .iter()
            .map(|row| {
                Ok(PackageClient {
                    client_version: require_cell_text(row, 0, &self.package_name)?.to_string(),
                    total_downloads: cell_count(row, 1),
                })
            })
            .collect()
    }

    /// Recent-window versions with per-client attribution.
    ///
    /// Cross-tabulates the version-grouped report against the
    /// version+client-grouped report: each version row picks up the
    /// contiguous block of client rows that belongs to it.
    pub async fn detailed_versions(&self) -> Result<Vec<PackageVersion>> {
        let by_version = stats_report(&self.http, &self.package_name, &["Version"]).await?;
        let by_version_client =
            stats_report(&self.http, &self.package_name, &["ClientVersion", "Version"]).await?;

        let mut versions = Vec::with_capacity(by_version.table.len());
        for row in &by_version.table {
            let version = require_cell_text(row, 0, &self.package_name)?;
            let clients = clients_for_version(&by_version_client.table, version, &self.package_name)?;
            versions.push(PackageVersion {
                package_name: self.package_name.clone(),
                version: version.to_string(),
                total_downloads: cell_count(row, 1),
                clients,
            });
        }

        info!(
            "Cross-tabulated {} versions for '{}'",
            versions.len(),
            self.package_name
        );
        Ok(versions)
    }

    /// Total downloads across all versions over the report's recent window.
    pub async fn recent_total_downloads(&self) -> Result<u64> {
        let report = stats_report(&self.http, &self.package_name, &["Version"]).await?;
        Ok(report.table.iter().map(|row| cell_count(row, 1)).sum())
    }

    /// Download total for one version, from the search API's lifetime
    /// figures. An unknown version counts as zero.
    pub async fn recent_total_downloads_by_version(&self, version: &str) -> Result<u64> {
        let versions = self.versions().await?;
        Ok(version_downloads(&versions, version))
    }

    /// Recent-window download total for one client version. An unknown
    /// client counts as zero.
    pub async fn recent_total_downloads_by_client(&self, client: &str) -> Result<u64> {
        let clients = self.clients().await?;
        Ok(client_downloads(&clients, client))
    }
}
