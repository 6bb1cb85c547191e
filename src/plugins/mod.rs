//! Collaborators around the catalog: DOI publication, the user directory and
//! the memoisation cache.

pub mod memoisation;
pub mod users;
pub mod zenodo;
