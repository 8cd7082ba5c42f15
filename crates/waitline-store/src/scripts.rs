//! Lua scripts executed atomically by the store.
//!
//! Each multi-key transition lives in exactly one script. Lease hashes are
//! addressed by appending a user id to the tenant's lease prefix; the hash
//! tag in every key keeps them in the tenant's slot.

/// Atomic enter.
///
/// KEYS[1] = wait list, KEYS[2] = active set, KEYS[3] = lease hash
/// ARGV[1] = user id, ARGV[2] = now (ms)
///
/// Returns a JSON object tagged by `result`:
///   NEW / ALREADY_WAITING with `rank` (0-based) and `total`
///   ALREADY_ADMITTED with the raw `lease` fields
pub const ENTER_SCRIPT: &str = r#"
    local user = ARGV[1]
    local now = tonumber(ARGV[2])

    local raw = redis.call('HGETALL', KEYS[3])
    if #raw > 0 then
        local lease = {}
        for i = 1, #raw, 2 do
            lease[raw[i]] = raw[i + 1]
        end
        local status = lease['status']
        local expires_at = tonumber(lease['expires_at'])
        local known = status == 'READY' or status == 'ACTIVE' or status == 'EXPIRED'
        -- Unreadable records are handed back so the caller reports them
        if not known or not expires_at then
            return cjson.encode({result = 'ALREADY_ADMITTED', lease = lease})
        end
        if status ~= 'EXPIRED' and expires_at >= now then
            return cjson.encode({result = 'ALREADY_ADMITTED', lease = lease})
        end
        redis.call('DEL', KEYS[3])
        redis.call('ZREM', KEYS[2], user)
    end

    local rank = redis.call('ZRANK', KEYS[1], user)
    if rank then
        return cjson.encode({
            result = 'ALREADY_WAITING',
            rank = rank,
            total = redis.call('ZCARD', KEYS[1])
        })
    end

    redis.call('ZADD', KEYS[1], now, user)
    rank = redis.call('ZRANK', KEYS[1], user)
    return cjson.encode({
        result = 'NEW',
        rank = rank,
        total = redis.call('ZCARD', KEYS[1])
    })
"#;

/// Add to the wait list if absent.
///
/// KEYS[1] = wait list
/// ARGV[1] = user id, ARGV[2] = arrival score (ms)
///
/// Returns the 0-based rank.
pub const ADD_TO_WAIT_SCRIPT: &str = r#"
    local rank = redis.call('ZRANK', KEYS[1], ARGV[1])
    if rank then
        return rank
    end
    redis.call('ZADD', KEYS[1], ARGV[2], ARGV[1])
    return redis.call('ZRANK', KEYS[1], ARGV[1])
"#;

/// Promote the head of the wait list.
///
/// KEYS[1] = wait list, KEYS[2] = active set
/// ARGV[1] = lease key prefix, ARGV[2] = batch size, ARGV[3] = capacity
/// ARGV[4] = lease expiry (ms), ARGV[5] = now (ms), ARGV[6] = key TTL (ms)
/// ARGV[7..] = one fresh token per batch slot
///
/// Returns a JSON array of the promoted user ids in arrival order.
pub const MIGRATE_SCRIPT: &str = r#"
    local n = tonumber(ARGV[2])
    local free = tonumber(ARGV[3]) - redis.call('ZCARD', KEYS[2])
    if free < n then
        n = free
    end
    if n <= 0 then
        return '[]'
    end

    local now = tonumber(ARGV[5])
    local popped = redis.call('ZPOPMIN', KEYS[1], n)
    local moved = {}
    local slot = 7
    for i = 1, #popped, 2 do
        local user = popped[i]
        local lease_key = ARGV[1] .. user
        local status = redis.call('HGET', lease_key, 'status')
        local expires_at = tonumber(redis.call('HGET', lease_key, 'expires_at'))
        local live = (status == 'READY' or status == 'ACTIVE')
            and expires_at ~= nil and expires_at >= now
        if not live then
            redis.call('DEL', lease_key)
            redis.call('HSET', lease_key,
                'token', ARGV[slot],
                'status', 'READY',
                'expires_at', ARGV[4],
                'extend_count', '0')
            redis.call('PEXPIRE', lease_key, ARGV[6])
            redis.call('ZADD', KEYS[2], ARGV[4], user)
            moved[#moved + 1] = user
        end
        slot = slot + 1
    end

    if #moved == 0 then
        return '[]'
    end
    return cjson.encode(moved)
"#;

/// READY -> ACTIVE.
///
/// KEYS[1] = lease hash, KEYS[2] = active set
/// ARGV[1] = user id, ARGV[2] = now (ms), ARGV[3] = new expiry (ms)
/// ARGV[4] = key TTL (ms)
///
/// Returns:
///   1 = promoted
///  -1 = already active (idempotent)
///   0 = not found
///  -2 = expired
///  -3 = unreadable record
pub const ACTIVATE_SCRIPT: &str = r#"
    local status = redis.call('HGET', KEYS[1], 'status')
    if not status then
        return 0
    end
    local expires_at = tonumber(redis.call('HGET', KEYS[1], 'expires_at'))
    if not expires_at then
        return -3
    end
    local now = tonumber(ARGV[2])

    if status == 'ACTIVE' then
        if expires_at >= now then
            return -1
        end
        return -2
    elseif status == 'READY' then
        if expires_at < now then
            return -2
        end
        redis.call('HSET', KEYS[1], 'status', 'ACTIVE', 'expires_at', ARGV[3])
        redis.call('PEXPIRE', KEYS[1], ARGV[4])
        redis.call('ZADD', KEYS[2], ARGV[3], ARGV[1])
        return 1
    elseif status == 'EXPIRED' then
        return -2
    end
    return -3
"#;

/// Extend a lease.
///
/// KEYS[1] = lease hash, KEYS[2] = active set
/// ARGV[1] = user id, ARGV[2] = now (ms), ARGV[3] = new expiry (ms)
/// ARGV[4] = max extensions, ARGV[5] = key TTL (ms)
///
/// Returns the new extension count, or:
///  -1 = not found
///  -2 = limit reached
///  -3 = not active
///  -4 = expired
///  -5 = unreadable record
pub const EXTEND_SCRIPT: &str = r#"
    local status = redis.call('HGET', KEYS[1], 'status')
    if not status then
        return -1
    end
    local count = tonumber(redis.call('HGET', KEYS[1], 'extend_count'))
    local expires_at = tonumber(redis.call('HGET', KEYS[1], 'expires_at'))
    if not count or not expires_at then
        return -5
    end
    if status ~= 'READY' and status ~= 'ACTIVE' and status ~= 'EXPIRED' then
        return -5
    end

    if count >= tonumber(ARGV[4]) then
        return -2
    end
    if status == 'EXPIRED' then
        return -3
    end
    if expires_at < tonumber(ARGV[2]) then
        return -4
    end

    count = redis.call('HINCRBY', KEYS[1], 'extend_count', 1)
    redis.call('HSET', KEYS[1], 'expires_at', ARGV[3])
    redis.call('PEXPIRE', KEYS[1], ARGV[5])
    redis.call('ZADD', KEYS[2], ARGV[3], ARGV[1])
    return count
"#;

/// Write a complete lease.
///
/// KEYS[1] = lease hash, KEYS[2] = active set, KEYS[3] = wait list
/// ARGV[1] = user id, ARGV[2] = token, ARGV[3] = status
/// ARGV[4] = expiry (ms), ARGV[5] = extend count, ARGV[6] = key TTL (ms)
pub const CREATE_LEASE_SCRIPT: &str = r#"
    redis.call('DEL', KEYS[1])
    redis.call('HSET', KEYS[1],
        'token', ARGV[2],
        'status', ARGV[3],
        'expires_at', ARGV[4],
        'extend_count', ARGV[5])
    redis.call('PEXPIRE', KEYS[1], ARGV[6])
    if ARGV[3] == 'READY' or ARGV[3] == 'ACTIVE' then
        redis.call('ZADD', KEYS[2], ARGV[4], ARGV[1])
    else
        redis.call('ZREM', KEYS[2], ARGV[1])
    end
    redis.call('ZREM', KEYS[3], ARGV[1])
    return 1
"#;

/// Change the status of an existing lease.
///
/// KEYS[1] = lease hash, KEYS[2] = active set
/// ARGV[1] = user id, ARGV[2] = status
///
/// Returns 1 when the lease existed, 0 otherwise.
pub const SET_STATUS_SCRIPT: &str = r#"
    if redis.call('EXISTS', KEYS[1]) == 0 then
        return 0
    end
    redis.call('HSET', KEYS[1], 'status', ARGV[2])
    if ARGV[2] == 'READY' or ARGV[2] == 'ACTIVE' then
        local expires_at = redis.call('HGET', KEYS[1], 'expires_at')
        redis.call('ZADD', KEYS[2], expires_at, ARGV[1])
    else
        redis.call('ZREM', KEYS[2], ARGV[1])
    end
    return 1
"#;

/// Change the expiry of an existing lease.
///
/// KEYS[1] = lease hash, KEYS[2] = active set
/// ARGV[1] = user id, ARGV[2] = expiry (ms), ARGV[3] = key TTL (ms)
///
/// Returns 1 when the lease existed, 0 otherwise.
pub const SET_EXPIRY_SCRIPT: &str = r#"
    if redis.call('EXISTS', KEYS[1]) == 0 then
        return 0
    end
    redis.call('HSET', KEYS[1], 'expires_at', ARGV[2])
    redis.call('PEXPIRE', KEYS[1], ARGV[3])
    local status = redis.call('HGET', KEYS[1], 'status')
    if status == 'READY' or status == 'ACTIVE' then
        redis.call('ZADD', KEYS[2], ARGV[2], ARGV[1])
    end
    return 1
"#;

/// Bump the extension count of an existing lease.
///
/// KEYS[1] = lease hash
///
/// Returns the new count, or -1 when the lease does not exist.
pub const INCR_EXTEND_SCRIPT: &str = r#"
    if redis.call('EXISTS', KEYS[1]) == 0 then
        return -1
    end
    return redis.call('HINCRBY', KEYS[1], 'extend_count', 1)
"#;

/// Delete a lease and its active-set entry.
///
/// KEYS[1] = lease hash, KEYS[2] = active set
/// ARGV[1] = user id
///
/// Returns the number of structures touched.
pub const REMOVE_LEASE_SCRIPT: &str = r#"
    local removed = redis.call('DEL', KEYS[1])
    removed = removed + redis.call('ZREM', KEYS[2], ARGV[1])
    return removed
"#;

/// Withdraw a user from every structure of the tenant.
///
/// KEYS[1] = lease hash, KEYS[2] = active set, KEYS[3] = wait list
/// ARGV[1] = user id
///
/// Returns `{lease_removed, wait_removed}` as 0/1 flags.
pub const WITHDRAW_SCRIPT: &str = r#"
    local lease = redis.call('DEL', KEYS[1])
    local entry = redis.call('ZREM', KEYS[2], ARGV[1])
    local waiting = redis.call('ZREM', KEYS[3], ARGV[1])
    local held = 0
    if lease + entry > 0 then
        held = 1
    end
    return {held, waiting}
"#;

/// Reclaim expired leases.
///
/// KEYS[1] = active set
/// ARGV[1] = lease key prefix, ARGV[2] = now (ms), ARGV[3] = batch limit
///
/// Returns how many leases were removed in this batch.
pub const RECLAIM_SCRIPT: &str = r#"
    local expired = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[2],
        'LIMIT', 0, tonumber(ARGV[3]))
    for _, user in ipairs(expired) do
        redis.call('DEL', ARGV[1] .. user)
        redis.call('ZREM', KEYS[1], user)
    end
    return #expired
"#;
