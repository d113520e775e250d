mod conn;
mod responses;
mod schema;

pub use conn::Database;
pub use responses::{matches_dates, Ratings, Response, ResponseStore, COLUMNS};
pub use schema::{SchemaManager, SchemaVersion};
