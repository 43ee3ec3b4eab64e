//! Build script for server crate.
//!
//! `sqlx::migrate!` embeds `migrations/` at compile time; make Cargo rebuild
//! when a migration is added or edited.

fn main() {
    println!("cargo:rerun-if-changed=migrations");
}
