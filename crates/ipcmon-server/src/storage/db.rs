//! `SQLite` database for the ipcmon server.

pub use ipcmon_core::db::DatabaseError;

ipcmon_core::define_database!(ServerDatabase);
