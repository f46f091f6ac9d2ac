//! Built-in handlers for GPU activity traces
//!
//! Maps decoded GPU runtime events onto the attribute tree:
//!
//! ```text
//! gpu{N}/queues/queue{M}    kernel executions per hardware queue
//! gpu{N}/streams/stream{M}  same kernels mirrored per API-level stream
//! host/threads/thread{T}    runtime API call stacks
//! memory/transfers          host<->device copies
//! ```
//!
//! Kernel-execution records arrive on the device timeline and carry only
//! a correlation id; the symbolic kernel name and target stream live on
//! the host-side API event that issued the launch. [`GpuApiHandler`]
//! records a snapshot of each launching call, and [`GpuActivityHandler`]
//! joins against it — falling back to the configured placeholder when the
//! launch was never captured. Activities whose end timestamp rides on the
//! start record go through the parallel-push path with a deferred lane
//! close; API calls with a known end schedule a deferred pop instead.

use crate::builder::StateBuilder;
use crate::correlation::EventSnapshot;
use crate::deferred::Mutation;
use crate::errors::Result;
use crate::event::{EventRecord, FieldDescriptor, FieldKind};
use crate::handler::EventHandler;
use crate::value::StateValue;

/// Event names produced by the decoding layer
pub mod events {
    pub const KERNEL_EXECUTION: &str = "kernel_execution";
    pub const MEMORY_TRANSFER: &str = "memory_transfer";
    pub const API_CALL: &str = "api_call";
}

/// Field names shared by the GPU event family
pub mod fields {
    pub const NAME: &str = "name";
    pub const CORRELATION_ID: &str = "correlation_id";
    pub const END_TS: &str = "end_ts";
    pub const QUEUE_ID: &str = "queue_id";
    pub const DEVICE_ID: &str = "device_id";
    pub const STREAM_ID: &str = "stream_id";
    pub const THREAD_ID: &str = "thread_id";
    pub const KERNEL_NAME: &str = "kernel_name";
}

const KERNEL_TABLE: &[FieldDescriptor] = &[
    FieldDescriptor::required(fields::CORRELATION_ID, FieldKind::Int),
    FieldDescriptor::required(fields::QUEUE_ID, FieldKind::Int),
    FieldDescriptor::required(fields::DEVICE_ID, FieldKind::Int),
    FieldDescriptor::required(fields::END_TS, FieldKind::Int),
];

const TRANSFER_TABLE: &[FieldDescriptor] = &[
    FieldDescriptor::optional(fields::NAME, FieldKind::Str),
    FieldDescriptor::optional(fields::END_TS, FieldKind::Int),
];

const API_TABLE: &[FieldDescriptor] = &[
    FieldDescriptor::required(fields::NAME, FieldKind::Str),
    FieldDescriptor::required(fields::THREAD_ID, FieldKind::Int),
    FieldDescriptor::optional(fields::CORRELATION_ID, FieldKind::Int),
    FieldDescriptor::optional(fields::END_TS, FieldKind::Int),
    FieldDescriptor::optional(fields::KERNEL_NAME, FieldKind::Str),
    FieldDescriptor::optional(fields::STREAM_ID, FieldKind::Int),
];

/// Handler for device-side activity: kernel executions and memory
/// transfers
#[derive(Debug, Default)]
pub struct GpuActivityHandler;

impl GpuActivityHandler {
    pub fn new() -> Self {
        GpuActivityHandler
    }

    fn handle_kernel(&self, builder: &mut StateBuilder, event: &EventRecord) -> Result<()> {
        // Validated required fields; absence here would be a processor bug.
        let correlation_id = event.field_int(fields::CORRELATION_ID).unwrap_or(-1) as u64;
        let queue_id = event.field_int(fields::QUEUE_ID).unwrap_or(0);
        let device_id = event.field_int(fields::DEVICE_ID).unwrap_or(0);
        let end = event.field_int(fields::END_TS).unwrap_or(event.timestamp);

        // The launch snapshot holds the symbolic name and target stream;
        // the placeholder keeps truncated traces renderable.
        let snapshot = builder.lookup_correlation(correlation_id);
        let kernel_name = snapshot
            .as_ref()
            .and_then(|s| s.field_str(fields::KERNEL_NAME))
            .unwrap_or(&builder.config().correlation_placeholder)
            .to_string();
        let stream_id = snapshot.as_ref().and_then(|s| s.field_int(fields::STREAM_ID));

        let gpu = format!("gpu{}", device_id);
        let queue = format!("queue{}", queue_id);
        let queue_stack = builder.quark_absolute_and_add(&[&gpu, "queues", &queue]);
        builder.push_parallel_activity(
            event.timestamp,
            end,
            StateValue::Str(kernel_name.clone()),
            queue_stack,
        )?;

        if let Some(stream_id) = stream_id {
            let stream = format!("stream{}", stream_id);
            let stream_stack = builder.quark_absolute_and_add(&[&gpu, "streams", &stream]);
            builder.push_parallel_activity(
                event.timestamp,
                end,
                StateValue::Str(kernel_name),
                stream_stack,
            )?;
        }
        Ok(())
    }

    fn handle_transfer(&self, builder: &mut StateBuilder, event: &EventRecord) -> Result<()> {
        let stack = builder.quark_absolute_and_add(&["memory", "transfers"]);
        match event.field_str(fields::NAME) {
            None => {
                // Nameless record marks end of transfer activity.
                builder.modify_attribute(event.timestamp, StateValue::Null, stack)
            }
            Some(name) => {
                let name = name.to_string();
                builder.push_attribute(event.timestamp, StateValue::Str(name), stack)?;
                if let Some(end) = event.field_int(fields::END_TS) {
                    builder.schedule(end, stack, Mutation::Pop);
                }
                Ok(())
            }
        }
    }
}

impl EventHandler for GpuActivityHandler {
    fn id(&self) -> &'static str {
        "gpu-activity"
    }

    fn accepts(&self, event: &EventRecord) -> bool {
        event.name == events::KERNEL_EXECUTION || event.name == events::MEMORY_TRANSFER
    }

    fn descriptors(&self, event: &EventRecord) -> &'static [FieldDescriptor] {
        if event.name == events::KERNEL_EXECUTION {
            KERNEL_TABLE
        } else {
            TRANSFER_TABLE
        }
    }

    fn handle(&mut self, builder: &mut StateBuilder, event: &EventRecord) -> Result<()> {
        if event.name == events::KERNEL_EXECUTION {
            self.handle_kernel(builder, event)
        } else {
            self.handle_transfer(builder, event)
        }
    }
}

/// Handler for host-side runtime API calls
///
/// Pushes the call onto the issuing thread's stack and, when the record
/// carries a correlation id, captures a snapshot for the device-side join.
#[derive(Debug, Default)]
pub struct GpuApiHandler;

impl GpuApiHandler {
    pub fn new() -> Self {
        GpuApiHandler
    }
}

impl EventHandler for GpuApiHandler {
    fn id(&self) -> &'static str {
        "gpu-api"
    }

    fn accepts(&self, event: &EventRecord) -> bool {
        event.name == events::API_CALL
    }

    fn descriptors(&self, _event: &EventRecord) -> &'static [FieldDescriptor] {
        API_TABLE
    }

    fn handle(&mut self, builder: &mut StateBuilder, event: &EventRecord) -> Result<()> {
        let name = event.field_str(fields::NAME).unwrap_or_default().to_string();
        let thread_id = event.field_int(fields::THREAD_ID).unwrap_or(0);

        if let Some(correlation_id) = event.field_int(fields::CORRELATION_ID) {
            builder.record_correlation(correlation_id as u64, EventSnapshot::of(event));
        }

        let thread = format!("thread{}", thread_id);
        let stack = builder.quark_absolute_and_add(&["host", "threads", &thread]);
        builder.push_attribute(event.timestamp, StateValue::Str(name), stack)?;
        if let Some(end) = event.field_int(fields::END_TS) {
            builder.schedule(end, stack, Mutation::Pop);
        }
        Ok(())
    }
}
