// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Header carrying the hex-encoded HMAC-SHA256 of the request or response body.
pub const HASH_HEADER: &str = "HashSHA256";

/// Header value that explicitly opts a request out of signature verification.
pub const HASH_SENTINEL: &str = "none";

/// Header carrying the agent's outbound address, checked against the trusted subnet.
pub const REAL_IP_HEADER: &str = "X-Real-IP";

/// Route accepting a single JSON metric record.
pub const UPDATE_PATH: &str = "/update/";

/// Route accepting a JSON array of metric records.
pub const UPDATES_PATH: &str = "/updates/";

/// Route returning the stored value of a single JSON metric record.
pub const VALUE_PATH: &str = "/value/";

/// Name of the synthetic counter appended to every agent batch.
pub const POLL_COUNT_METRIC: &str = "PollCount";
