//! Names of the runtime symbols generated code is allowed to assume
//! exist. Centralized here so every pass and the emitter spell them
//! identically, and so a future runtime version bump touches one file.

pub const META_INCLUDE: &str = "cc_runtime.h";

pub fn closure_make(arity: usize) -> String {
    format!("cc_closure{}_make", arity)
}

pub fn closure_call(arity: usize) -> String {
    format!("cc_closure{}_call", arity)
}

/// The closure handle type a `make` call of the given arity returns,
/// e.g. `CCClosure2` — see `ast::ty::parse_closure_handle_type` for
/// the inverse.
pub fn closure_handle_type(arity: usize) -> String {
    format!("CCClosure{}", arity)
}

/// Marker type text an upstream pass can stamp on a declaration whose
/// real type isn't known yet; the emitter replaces it with `void*`
/// since nothing downstream of this crate understands the marker.
pub const INTERNAL_PLACEHOLDER_TYPE: &str = "__CCInternal";

pub const TASK_INTPTR_TYPE: &str = "CCTaskIntptr";
pub const TASK_INTPTR_MAKE_POLL_EX: &str = "cc_task_intptr_make_poll_ex";
pub const TASK_INTPTR_POLL: &str = "cc_task_intptr_poll";
pub const RUN_BLOCKING_TASK_INTPTR: &str = "cc_run_blocking_task_intptr";
pub const TASK_INTPTR_FREE: &str = "cc_task_intptr_free";

pub const NURSERY_OPEN: &str = "cc_nursery_open";
pub const NURSERY_CLOSE: &str = "cc_nursery_close";
pub const NURSERY_SPAWN_CLOSURE0: &str = "cc_nursery_spawn_closure0";

pub const DEADLINE_AFTER_MS: &str = "cc_deadline_after_ms";
pub const DEADLINE_PUSH: &str = "cc_deadline_push";
pub const DEADLINE_POP: &str = "cc_deadline_pop";
pub const DEADLINE_EXPIRED: &str = "cc_deadline_expired";

pub const TRY_HELPER: &str = "cc_try";

pub const CHAN_SEND: &str = "cc_chan_send";
pub const CHAN_RECV: &str = "cc_chan_recv";
pub const CHAN_SEND_TAKE: &str = "cc_chan_send_take";
pub const CHAN_SEND_TAKE_PTR: &str = "cc_chan_send_take_ptr";
pub const CHAN_SEND_TAKE_SLICE: &str = "cc_chan_send_take_slice";
pub const CHAN_SEND_TASK: &str = "cc_chan_send_task";
pub const CHAN_RECV_TASK: &str = "cc_chan_recv_task";

const CHANNEL_PRIMITIVES: &[&str] = &[
    CHAN_SEND,
    CHAN_RECV,
    CHAN_SEND_TAKE,
    CHAN_SEND_TAKE_PTR,
    CHAN_SEND_TAKE_SLICE,
    CHAN_SEND_TASK,
    CHAN_RECV_TASK,
];

/// True for the blocking-channel entry points the auto-blocking pass
/// must still treat as blocking candidates even when they appear
/// syntactically inside an `await` operand: the task-valued
/// counterparts exist precisely so a channel call written under
/// `await` still gets rewritten into a task dispatch rather than
/// passed through untouched like an ordinary async-call await.
pub fn is_channel_primitive(name: &str) -> bool {
    CHANNEL_PRIMITIVES.contains(&name)
}

/// Tri-state status type returned by a poll function.
pub const FUTURE_STATUS_TYPE: &str = "CCFutureStatus";
pub const STATUS_PENDING: &str = "CC_PENDING";
pub const STATUS_READY: &str = "CC_READY";
pub const STATUS_ERR: &str = "CC_ERR";

/// Any identifier the emitter generates uses one of these two
/// prefixes; user-defined names colliding with them are filtered
/// before emission.
pub const GENERATED_PREFIX_LOWER: &str = "__cc_";
pub const GENERATED_PREFIX_UPPER: &str = "__CC";

pub fn is_reserved_identifier(name: &str) -> bool {
    name.starts_with(GENERATED_PREFIX_LOWER) || name.starts_with(GENERATED_PREFIX_UPPER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closure_helpers_key_by_arity() {
        assert_eq!(closure_make(0), "cc_closure0_make");
        assert_eq!(closure_call(2), "cc_closure2_call");
    }

    #[test]
    fn reserved_prefix_detection() {
        assert!(is_reserved_identifier("__cc_closure_make_3"));
        assert!(is_reserved_identifier("__CCFrame12"));
        assert!(!is_reserved_identifier("my_function"));
    }

    #[test]
    fn channel_primitives_are_recognized_and_nothing_else_is() {
        assert!(is_channel_primitive(CHAN_SEND));
        assert!(is_channel_primitive(CHAN_RECV));
        assert!(is_channel_primitive(CHAN_SEND_TAKE));
        assert!(is_channel_primitive(CHAN_SEND_TAKE_PTR));
        assert!(is_channel_primitive(CHAN_SEND_TAKE_SLICE));
        assert!(is_channel_primitive(CHAN_SEND_TASK));
        assert!(is_channel_primitive(CHAN_RECV_TASK));
        assert!(!is_channel_primitive("some_user_function"));
    }
}
