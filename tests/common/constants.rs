//! Identifiers shared by the integration tests

pub const BASE_EVENT_ID: &str = "evt-base-training";
pub const SERIES_ID: &str = "series-training";
pub const OTHER_SERIES_ID: &str = "series-match";

pub const BASE_TITLE: &str = "Tuesday training";
pub const BASE_CREATED_BY: &str = "coach-ana";
