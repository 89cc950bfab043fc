// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use rand::Rng;
use rand::distr::Alphanumeric;
use time::OffsetDateTime;
use time::macros::format_description;

const ALIAS_LEN: usize = 10;
const SECRET_LEN: usize = 48;

/// Random lowercase alias used as a user's name on clusters.
pub fn generate_user_alias() -> String {
    let mut rng = rand::rng();
    (0..ALIAS_LEN)
        .map(|_| {
            let idx = rng.random_range(0..26);
            (b'a' + idx) as char
        })
        .collect()
}

/// Process-local signing secret for when none is configured.
pub fn generate_secret() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(SECRET_LEN)
        .map(char::from)
        .collect()
}

/// TensorBoard containers are named per tenant, training and launch time (microseconds).
pub fn tensorboard_container_name(
    tenant_id: i64,
    training_id: i64,
    now: OffsetDateTime,
) -> String {
    let stamp = now
        .format(format_description!(
            "[year][month][day][hour][minute][second][subsecond digits:6]"
        ))
        .unwrap_or_else(|_| now.unix_timestamp().to_string());
    format!("tensorboard-{tenant_id:04}-{training_id}-{stamp}")
}
