//! Background task placement.
//!
//! The supervisor runs as a plain `std::thread`. On ESP-IDF the thread
//! is a FreeRTOS task whose core, priority and stack come from the
//! pthread config installed just before spawning; on the host only the
//! name and stack size apply.

use std::io;
use std::thread::JoinHandle;

/// ESP32 CPU the task is pinned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Core {
    /// Core 0: radio and BLE host stacks live here.
    Pro = 0,
    /// Core 1: application work.
    App = 1,
}

/// Where and how a background task runs.
#[derive(Debug, Clone, Copy)]
pub struct TaskSpec {
    /// Null-terminated, so it can be handed to FreeRTOS as is.
    pub name: &'static str,
    pub core: Core,
    pub priority: u8,
    pub stack_kb: usize,
}

impl TaskSpec {
    /// Task name without the trailing NUL.
    pub fn display_name(&self) -> &'static str {
        self.name.trim_end_matches('\0')
    }

    fn stack_bytes(&self) -> usize {
        self.stack_kb * 1024
    }

    /// Start `f` on a new task described by `self`.
    pub fn spawn(self, f: impl FnOnce() + Send + 'static) -> io::Result<JoinHandle<()>> {
        self.configure()?;
        log::debug!(
            "Task: spawning '{}' on {:?} (prio {}, {} KB)",
            self.display_name(),
            self.core,
            self.priority,
            self.stack_kb
        );
        std::thread::Builder::new()
            .name(self.display_name().into())
            .stack_size(self.stack_bytes())
            .spawn(f)
    }

    /// Install the pthread config the next `pthread_create` on this
    /// thread picks up. Must directly precede the spawn.
    #[cfg(target_os = "espidf")]
    fn configure(&self) -> io::Result<()> {
        if !self.name.ends_with('\0') {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "task name must be null-terminated",
            ));
        }
        // SAFETY: `cfg` lives across the call; `name` is 'static and
        // null-terminated (checked above).
        let ret = unsafe {
            let mut cfg = esp_idf_sys::esp_create_default_pthread_config();
            cfg.pin_to_core = self.core as i32;
            cfg.prio = i32::from(self.priority);
            cfg.stack_size = self.stack_bytes() as i32;
            cfg.thread_name = self.name.as_ptr().cast();
            esp_idf_sys::esp_pthread_set_cfg(&cfg)
        };
        if ret == esp_idf_sys::ESP_OK as i32 {
            Ok(())
        } else {
            Err(io::Error::other(format!("esp_pthread_set_cfg: {ret}")))
        }
    }

    #[cfg(not(target_os = "espidf"))]
    #[allow(clippy::unnecessary_wraps, clippy::unused_self)]
    fn configure(&self) -> io::Result<()> {
        Ok(())
    }
}
