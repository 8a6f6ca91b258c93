//! Image generation providers.

mod modelscope;

pub use modelscope::{
    async_poll_options, parse_task_status, ImageTaskSource, ModelScopeProvider,
    ASYNC_POLL_INTERVAL, ASYNC_POLL_TIMEOUT,
};
