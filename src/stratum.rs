use super::*;

mod authorize;
mod error;
mod job_id;
mod message;
mod nonce;
mod notify;
mod ntime;
mod set_target;
mod solution;
mod submit;
mod subscribe;
mod username;

pub use {
    authorize::Authorize,
    error::{InternalError, StratumError},
    job_id::JobId,
    message::{Id, Message},
    nonce::Nonce,
    notify::Notify,
    ntime::Ntime,
    set_target::SetTarget,
    solution::Solution,
    submit::Submit,
    subscribe::Subscribe,
    username::Username,
};
