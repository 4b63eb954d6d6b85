//! Download and ranking statistics for packages across five registries:
//! Packagist (PHP), NuGet (.NET), npm (Node), PyPI (Python), and
//! bestgems.org (Ruby).
//!
//! Each registry gets its own module with its own record shapes; the five
//! upstream APIs share no common schema, so no shared base type is forced
//! on them. A `Package` (or [`rubygems::Gem`]) is a stateless handle: every
//! accessor performs a fresh API call and nothing is cached, so repeated
//! calls always reflect live upstream state.
//!
//! ```no_run
//! # async fn demo() -> pkgstats::Result<()> {
//! let package = pkgstats::packagist::Package::new("phpunit", "phpunit")?;
//! let total = package.total_downloads_lifetime().await?;
//! println!("phpunit/phpunit has {total} lifetime downloads");
//!
//! let gem = pkgstats::rubygems::Gem::new("rails")?;
//! for stat in gem.daily_ranking().await? {
//!     println!("{}: #{}", stat.date, stat.rank);
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
mod fetch;
pub mod npm;
pub mod nuget;
pub mod packagist;
pub mod pypi;
pub mod rubygems;

pub use error::{Error, Result};
