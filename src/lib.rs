//! Source-based package manager core.
//!
//! Recipes are line-oriented `<name>.pkg` files that declare how to fetch,
//! build, and install one package:
//!
//! ```text
//! Name: hello
//! Version: 2.12
//! Source: https://ftp.gnu.org/gnu/hello/hello-2.12.tar.gz
//! Sha256: cf04af86dc085268c5f4470fbae49b18afbc221b78096aab842d934a76bad0ab
//! Depends: zlib
//! Build: |
//!   ./configure --prefix=/usr
//!   make $MAKEFLAGS
//! Build: end
//! Install: |
//!   make DESTDIR=$DESTDIR install
//! Install: end
//! ```
//!
//! An install runs the staged pipeline for every missing dependency first,
//! bottom-up in resolver order, then for the target:
//!
//! fetch → verify → extract → build → stage → strip → commit → register
//!
//! Installed state lives in an on-disk database ([`db::Database`]) with
//! reverse-dependency tracking and orphan detection; a single advisory lock
//! serializes operations. Composite actions (`install`, `remove`, `rebuild`,
//! `upgrade`, `autoremove`, …) live in [`ops`].

pub mod build;
pub mod config;
pub mod db;
pub mod deps;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod install;
pub mod lock;
pub mod logging;
pub mod ops;
pub mod output;
pub mod recipe;
pub mod shell;
pub mod version;

pub use config::Config;
pub use db::Database;
pub use error::Error;
pub use recipe::Recipe;
