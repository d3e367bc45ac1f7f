use chrono::{TimeZone, Utc};

use crate::model::{
    BlockStrategy, GlueType, HandleCallbackParam, IncrementKind, ResultEnvelope, TriggerMessage,
};
use crate::proto;

/// Wire encoding of a trigger message.
pub fn trigger_request_from_message(message: &TriggerMessage) -> proto::TriggerRequest {
    proto::TriggerRequest {
        job_id: message.job_id,
        executor_handler: message.executor_handler.clone(),
        executor_params: message.executor_params.clone(),
        block_strategy: message.block_strategy.as_str().to_string(),
        timeout_secs: message.timeout_secs,
        log_id: message.log_id,
        log_date_time_ms: message.log_date_time_ms,
        glue_type: message.glue_type.as_str().to_string(),
        glue_source: message.glue_source.clone(),
        glue_update_time_ms: message.glue_update_time_ms,
        broadcast_index: message.broadcast_index,
        broadcast_total: message.broadcast_total,
        increment_kind: message.increment_kind.map(|kind| kind.as_str().to_string()),
        start_id: message.start_id,
        end_id: message.end_id,
        start_time_ms: message.start_time.map(|t| t.timestamp_millis()),
        trigger_time_ms: message.trigger_time.map(|t| t.timestamp_millis()),
        partition_info: message.partition_info.clone(),
        replace_param: message.replace_param.clone(),
        replace_param_type: message.replace_param_type.clone(),
        runtime_param: message.runtime_param.clone(),
    }
}

/// Decode a wire trigger. Unknown strategy or glue names fall back to the
/// defaults rather than failing the call.
pub fn message_from_trigger_request(request: proto::TriggerRequest) -> TriggerMessage {
    TriggerMessage {
        job_id: request.job_id,
        executor_handler: request.executor_handler,
        executor_params: request.executor_params,
        block_strategy: BlockStrategy::parse(
            &request.block_strategy,
            BlockStrategy::SerialExecution,
        ),
        timeout_secs: request.timeout_secs,
        log_id: request.log_id,
        log_date_time_ms: request.log_date_time_ms,
        glue_type: GlueType::parse(&request.glue_type, GlueType::Handler),
        glue_source: request.glue_source,
        glue_update_time_ms: request.glue_update_time_ms,
        broadcast_index: request.broadcast_index,
        broadcast_total: request.broadcast_total,
        increment_kind: request
            .increment_kind
            .as_deref()
            .and_then(IncrementKind::parse),
        start_id: request.start_id,
        end_id: request.end_id,
        start_time: request
            .start_time_ms
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        trigger_time: request
            .trigger_time_ms
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        partition_info: request.partition_info,
        replace_param: request.replace_param,
        replace_param_type: request.replace_param_type,
        runtime_param: request.runtime_param,
    }
}

pub fn callback_item_from_param(param: &HandleCallbackParam) -> proto::CallbackItem {
    proto::CallbackItem {
        log_id: param.log_id,
        log_date_time_ms: param.log_date_time_ms,
        handle_code: param.handle_code,
        handle_msg: param.handle_msg.clone(),
        process_id: param.process_id.clone(),
    }
}

pub fn param_from_callback_item(item: proto::CallbackItem) -> HandleCallbackParam {
    HandleCallbackParam {
        log_id: item.log_id,
        log_date_time_ms: item.log_date_time_ms,
        handle_code: item.handle_code,
        handle_msg: item.handle_msg,
        process_id: item.process_id,
    }
}

pub fn envelope_from_reply<T>(reply: proto::RpcReply) -> ResultEnvelope<T> {
    ResultEnvelope {
        code: reply.code,
        msg: reply.msg,
        content: None,
    }
}

pub fn reply_from_envelope<T>(env: &ResultEnvelope<T>) -> proto::RpcReply {
    proto::RpcReply {
        code: env.code,
        msg: env.msg.clone(),
    }
}
