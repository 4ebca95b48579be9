pub mod web_search;
pub mod wikipedia;
