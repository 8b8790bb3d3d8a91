use redis::Script;
use std::sync::LazyLock;

pub const LOCK_ACQUIRE_SCRIPT_BODY: &str = include_str!("../../lua/lock_acquire.lua");
pub const LOCK_RELEASE_SCRIPT_BODY: &str = include_str!("../../lua/lock_release.lua");

pub static LOCK_ACQUIRE_SCRIPT: LazyLock<Script> = LazyLock::new(|| Script::new(LOCK_ACQUIRE_SCRIPT_BODY));
pub static LOCK_RELEASE_SCRIPT: LazyLock<Script> = LazyLock::new(|| Script::new(LOCK_RELEASE_SCRIPT_BODY));
