// /////////////////////////////////////////////////////////////////////////////
// Durable Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Lua scripts giving the state store its conditional, check-and-set
//! semantics without a client-side `WATCH`/`MULTI` round trip. `redis::Script`
//! caches the `SHA1` after the first upload, so steady-state calls are a
//! single `EVALSHA`.

use std::sync::LazyLock;

use redis::Script;

/// `SET key value NX` wrapped in Lua only so the caller gets a clean
/// boolean rather than inspecting a `(nil|"OK")` reply.
pub static CREATE_PIPELINE: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
        if redis.call('EXISTS', KEYS[1]) == 1 then
            return 0
        end
        redis.call('SET', KEYS[1], ARGV[1])
        return 1
        "#,
    )
});

/// Applies a pipeline status transition: refuses once the stored status is
/// terminal and differs from the requested one.
pub static SET_PIPELINE_STATUS: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
        local existing = redis.call('GET', KEYS[1])
        if not existing then
            return 0
        end
        local record = cjson.decode(existing)
        local terminal = { completed = true, failed = true, cancelled = true }
        if terminal[record.status] and record.status ~= ARGV[1] then
            return 0
        end
        record.status = ARGV[1]
        if ARGV[2] ~= '' then
            record.resume_cursor = tonumber(ARGV[2])
        end
        redis.call('SET', KEYS[1], cjson.encode(record))
        return 1
        "#,
    )
});

/// Merge-upserts a stage record, creating a `pending` default first if the
/// key does not yet exist.
pub static UPSERT_STAGE: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
        local existing = redis.call('GET', KEYS[1])
        local record
        if existing then
            record = cjson.decode(existing)
        else
            record = cjson.decode(ARGV[4])
        end
        if ARGV[1] ~= '' then record.status = ARGV[1] end
        if ARGV[2] ~= '' then record.task_count = tonumber(ARGV[2]) end
        if ARGV[3] ~= '' then record.completed_count = tonumber(ARGV[3]) end
        if ARGV[5] ~= '' then record.completed_at = ARGV[5] end
        local encoded = cjson.encode(record)
        redis.call('SET', KEYS[1], encoded)
        return encoded
        "#,
    )
});

/// Atomically bumps `completed_count` by `ARGV[1]` and returns the new total.
pub static INCREMENT_STAGE_PROGRESS: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
        local existing = redis.call('GET', KEYS[1])
        if not existing then
            return redis.error_reply('stage record missing')
        end
        local record = cjson.decode(existing)
        record.completed_count = (record.completed_count or 0) + tonumber(ARGV[1])
        redis.call('SET', KEYS[1], cjson.encode(record))
        return record.completed_count
        "#,
    )
});

/// Appends to the attempts ledger only the first time this
/// `(task_index, attempt, status)` triple is seen for the stage.
pub static RECORD_TASK_ATTEMPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
        if redis.call('SET', KEYS[1], '1', 'NX') then
            redis.call('RPUSH', KEYS[2], ARGV[1])
        end
        return 1
        "#,
    )
});

/// Succeeds iff `KEYS[1]` (the position key) is absent, expired, or already
/// held by `ARGV[2]` (the requested lease id) — re-acquisition by the
/// current holder is allowed so the orchestrator's enqueue-time acquire and
/// the worker's claim-time "acquire" of the same lease id both succeed.
pub static ACQUIRE_LEASE: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
        local existing = redis.call('GET', KEYS[1])
        if existing then
            local current = cjson.decode(existing)
            if current.expires_at_ms > tonumber(ARGV[3]) and current.lease_id ~= ARGV[2] then
                return 0
            end
        end
        redis.call('SET', KEYS[1], ARGV[1], 'PX', ARGV[4])
        redis.call('SET', KEYS[2], ARGV[1], 'PX', ARGV[4])
        return 1
        "#,
    )
});

/// Renews by lease id alone — the by-id record carries enough to rebuild
/// the positional key, so the caller need not know pipeline/stage/index.
pub static RENEW_LEASE: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
        local existing = redis.call('GET', KEYS[1])
        if not existing then
            return 0
        end
        local lease = cjson.decode(existing)
        if lease.lease_id ~= ARGV[1] then
            return 0
        end
        lease.expires_at_ms = tonumber(ARGV[2]) + tonumber(ARGV[3])
        local encoded = cjson.encode(lease)
        local position_key = 'pipeline:' .. lease.pipeline_id .. ':stage:' .. lease.stage_name ..
            ':task:' .. lease.task_index .. ':lease'
        redis.call('SET', KEYS[1], encoded, 'PX', ARGV[3])
        redis.call('SET', position_key, encoded, 'PX', ARGV[3])
        return 1
        "#,
    )
});

pub static RELEASE_LEASE: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
        local existing = redis.call('GET', KEYS[1])
        if not existing then
            return 0
        end
        local lease = cjson.decode(existing)
        if lease.lease_id ~= ARGV[1] then
            return 0
        end
        local position_key = 'pipeline:' .. lease.pipeline_id .. ':stage:' .. lease.stage_name ..
            ':task:' .. lease.task_index .. ':lease'
        redis.call('DEL', KEYS[1])
        redis.call('DEL', position_key)
        return 1
        "#,
    )
});

/// Moves due entries from a queue's delayed sorted set into its priority
/// list, atomically, so a poll loop never observes a half-moved item.
pub static DRAIN_DELAYED: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
        local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, 50)
        for _, message in ipairs(due) do
            redis.call('ZREM', KEYS[1], message)
            redis.call('RPUSH', KEYS[2], message)
        end
        return #due
        "#,
    )
});
