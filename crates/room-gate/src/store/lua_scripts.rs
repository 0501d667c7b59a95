//! Lua scripts for atomic room writes.
//!
//! Redis runs each script to completion without interleaving other
//! commands, so the read-check-write inside a script cannot race with a
//! concurrent registration for the same room. Every script replaces the
//! `connected` field with a single HSET.
//!
//! Shared return codes:
//! - `-1`: room record is malformed (no `connected`, or not a JSON array)
//! - `-2`: room does not exist
//! - `-3`: invalid script argument

/// Conditional append (membership check + capacity check + append).
///
/// Arguments:
/// - KEYS[1]: Room key (`meta:{roomId}`)
/// - ARGV[1]: Presented credential, or empty string
/// - ARGV[2]: New credential to append
/// - ARGV[3]: Room capacity
///
/// Returns:
/// - 1: Appended, or ARGV[2] was already listed (no write)
/// - 2: Presented credential already a member (no write)
/// - 0: Room full (no write)
pub const CONDITIONAL_APPEND: &str = r#"
local raw = redis.call('HGET', KEYS[1], 'connected')
if raw == false then
    if redis.call('EXISTS', KEYS[1]) == 0 then
        return -2
    end
    return -1
end

local ok, connected = pcall(cjson.decode, raw)
if not ok or type(connected) ~= 'table' then
    return -1
end

local candidate = ARGV[2]
for _, member in ipairs(connected) do
    if member == candidate then
        return 1
    end
end

local presented = ARGV[1]
if presented ~= '' then
    for _, member in ipairs(connected) do
        if member == presented then
            return 2
        end
    end
end

local limit = tonumber(ARGV[3])
if limit == nil then
    return -3
end

if #connected >= limit then
    return 0
end

table.insert(connected, candidate)
redis.call('HSET', KEYS[1], 'connected', cjson.encode(connected))
return 1
"#;

/// Compare-and-swap of the whole `connected` value.
///
/// Arguments:
/// - KEYS[1]: Room key (`meta:{roomId}`)
/// - ARGV[1]: Expected `connected` (JSON array)
/// - ARGV[2]: Replacement `connected` (JSON array, stored verbatim)
///
/// Returns:
/// - 1: Swapped
/// - 0: Conflict (current value differs from expected)
pub const COMPARE_AND_SWAP_CONNECTED: &str = r#"
local raw = redis.call('HGET', KEYS[1], 'connected')
if raw == false then
    if redis.call('EXISTS', KEYS[1]) == 0 then
        return -2
    end
    return -1
end

local ok, current = pcall(cjson.decode, raw)
if not ok or type(current) ~= 'table' then
    return -1
end

local ok_expected, expected = pcall(cjson.decode, ARGV[1])
if not ok_expected or type(expected) ~= 'table' then
    return -3
end

if #current ~= #expected then
    return 0
end

for i = 1, #current do
    if current[i] ~= expected[i] then
        return 0
    end
end

redis.call('HSET', KEYS[1], 'connected', ARGV[2])
return 1
"#;

/// Replace `connected` only if the room still exists.
///
/// Arguments:
/// - KEYS[1]: Room key (`meta:{roomId}`)
/// - ARGV[1]: Replacement `connected` (JSON array)
///
/// Returns:
/// - 1: Written
/// - 0: Room does not exist (no write)
pub const SET_CONNECTED_IF_EXISTS: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return 0
end

redis.call('HSET', KEYS[1], 'connected', ARGV[1])
return 1
"#;

/// Release a lease only if the caller still holds it.
///
/// Arguments:
/// - KEYS[1]: Lease key (`lease:{roomId}`)
/// - ARGV[1]: Holder id
///
/// Returns:
/// - 1: Released
/// - 0: Not held by this holder (expired or taken over)
pub const RELEASE_LEASE: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripts_touch_only_connected_field() {
        for script in [
            CONDITIONAL_APPEND,
            COMPARE_AND_SWAP_CONNECTED,
            SET_CONNECTED_IF_EXISTS,
        ] {
            assert!(script.contains("redis.call('HSET', KEYS[1], 'connected'"));
            assert!(!script.contains("createdAt"));
        }
    }

    #[test]
    fn test_conditional_append_checks_membership_before_capacity() {
        let membership = CONDITIONAL_APPEND
            .find("return 2")
            .unwrap_or(usize::MAX);
        let capacity = CONDITIONAL_APPEND
            .find("#connected >= limit")
            .unwrap_or(0);
        assert!(membership < capacity);
    }

    #[test]
    fn test_conditional_append_checks_candidate_before_capacity() {
        let candidate = CONDITIONAL_APPEND
            .find("if member == candidate then")
            .unwrap_or(usize::MAX);
        let presented = CONDITIONAL_APPEND
            .find("if member == presented then")
            .unwrap_or(0);
        let capacity = CONDITIONAL_APPEND
            .find("#connected >= limit")
            .unwrap_or(0);
        assert!(candidate < presented);
        assert!(candidate < capacity);
    }

    #[test]
    fn test_conditional_append_distinguishes_missing_and_malformed() {
        assert!(CONDITIONAL_APPEND.contains("redis.call('EXISTS', KEYS[1]) == 0"));
        assert!(CONDITIONAL_APPEND.contains("return -2"));
        assert!(CONDITIONAL_APPEND.contains("return -1"));
    }

    #[test]
    fn test_scripts_guard_json_decoding() {
        assert!(CONDITIONAL_APPEND.contains("pcall(cjson.decode, raw)"));
        assert!(COMPARE_AND_SWAP_CONNECTED.contains("pcall(cjson.decode, raw)"));
        assert!(COMPARE_AND_SWAP_CONNECTED.contains("pcall(cjson.decode, ARGV[1])"));
    }

    #[test]
    fn test_compare_and_swap_compares_every_element() {
        assert!(COMPARE_AND_SWAP_CONNECTED.contains("if #current ~= #expected then"));
        assert!(COMPARE_AND_SWAP_CONNECTED.contains("if current[i] ~= expected[i] then"));
    }

    #[test]
    fn test_release_lease_checks_holder() {
        assert!(RELEASE_LEASE.contains("redis.call('GET', KEYS[1]) == ARGV[1]"));
        assert!(RELEASE_LEASE.contains("DEL"));
    }
}
