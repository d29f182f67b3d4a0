//! Idempotent schema upgrades for the on-disk catalog file.
//!
//! Each migration is a pure function from one `schema_version` to the next;
//! running the full chain twice against the same file is a no-op.

use super::CatalogData;

pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Bring `data` up to `CURRENT_SCHEMA_VERSION` in place. Unknown future
/// versions are left alone rather than guessed at.
pub fn apply(data: &mut CatalogData) {
    while data.schema_version < CURRENT_SCHEMA_VERSION {
        match data.schema_version {
            0 => migrate_v0_to_v1(data),
            _ => break,
        }
    }
}

fn migrate_v0_to_v1(data: &mut CatalogData) {
    // v0 catalogs predate `next_tape_id`; derive it from the highest tape
    // id seen so new allocations never collide with existing rows.
    let max_id = data.tapes.keys().copied().max().unwrap_or(0);
    data.next_tape_id = data.next_tape_id.max(max_id + 1);
    data.schema_version = 1;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applying_twice_is_a_no_op() {
        let mut data = CatalogData::default();
        data.next_tape_id = 5;
        apply(&mut data);
        let after_first = data.clone();
        apply(&mut data);
        assert_eq!(after_first.schema_version, data.schema_version);
        assert_eq!(after_first.next_tape_id, data.next_tape_id);
    }
}
