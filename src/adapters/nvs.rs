//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements [`NetworkListStore`]: the saved-network list is one
//! postcard blob under a single key, replaced wholesale on every save.
//!
//! # Security
//!
//! - The blob carries pre-shared keys. On ESP32 the namespace belongs on
//!   the encrypted NVS partition. The simulation backend is plaintext
//!   (dev/test only).
//! - A write is one `nvs_set_blob` plus `nvs_commit`; a reboot mid-write
//!   leaves the previous list in place.
//! - A blob with an unknown version or that fails to decode is reported
//!   as [`StorageError::Corrupted`], never partially applied.

use std::ffi::CStr;
use std::sync::{Mutex, PoisonError};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::{NetworkListStore, StorageError};
use crate::network::profile::NetworkProfile;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
const LIST_NAMESPACE: &CStr = c"wifiprov";
#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
const LIST_KEY: &CStr = c"networks";
const BLOB_VERSION: u8 = 1;

#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
const MAX_BLOB_SIZE: usize = 2048;

/// On-flash layout of the saved list.
#[derive(Serialize, Deserialize)]
struct SavedListBlob {
    version: u8,
    networks: Vec<NetworkProfile>,
}

fn encode_blob(networks: &[NetworkProfile]) -> Result<Vec<u8>, StorageError> {
    let blob = SavedListBlob {
        version: BLOB_VERSION,
        networks: networks.to_vec(),
    };
    postcard::to_allocvec(&blob).map_err(|_| StorageError::IoError)
}

fn decode_blob(bytes: &[u8]) -> Result<Vec<NetworkProfile>, StorageError> {
    let blob: SavedListBlob = postcard::from_bytes(bytes).map_err(|_| StorageError::Corrupted)?;
    if blob.version != BLOB_VERSION {
        warn!("NvsAdapter: unknown list version {}", blob.version);
        return Err(StorageError::Corrupted);
    }
    Ok(blob.networks)
}

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    blob: Mutex<Option<Vec<u8>>>,
    /// Serialises open/write/commit sequences on the namespace.
    #[cfg(target_os = "espidf")]
    io: Mutex<()>,
}

impl NvsAdapter {
    /// Bring up NVS flash. A partition with no free pages or written by a
    /// newer IDF is erased and initialised again.
    pub fn new() -> Result<Self, StorageError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: runs once from the main task before any other NVS use.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NvsAdapter: partition unusable ({ret}), erasing");
                if unsafe { nvs_flash_erase() } != ESP_OK {
                    return Err(StorageError::IoError);
                }
                if unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(StorageError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(StorageError::IoError);
            }
            info!("NvsAdapter: flash ready");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsAdapter(sim): in-memory blob");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            blob: Mutex::new(None),
            #[cfg(target_os = "espidf")]
            io: Mutex::new(()),
        })
    }

    /// Overwrite the raw blob (simulation only; used to exercise
    /// corruption handling).
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_put_raw(&self, bytes: Vec<u8>) {
        *self.blob.lock().unwrap_or_else(PoisonError::into_inner) = Some(bytes);
    }

    /// Run `f` with the list namespace open; the handle is closed after.
    #[cfg(target_os = "espidf")]
    fn with_list_namespace<T>(
        write: bool,
        f: impl FnOnce(nvs_handle_t) -> Result<T, esp_err_t>,
    ) -> Result<T, esp_err_t> {
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };
        let mut handle: nvs_handle_t = 0;
        // SAFETY: namespace is a static C string; handle is written by the call.
        let ret = unsafe { nvs_open(LIST_NAMESPACE.as_ptr(), mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }
        let result = f(handle);
        // SAFETY: handle was opened above and is not used after this.
        unsafe { nvs_close(handle) };
        result
    }

    #[cfg(target_os = "espidf")]
    fn read_blob(&self) -> Result<Option<Vec<u8>>, StorageError> {
        let _io = self.io.lock().unwrap_or_else(PoisonError::into_inner);
        let result = Self::with_list_namespace(false, |handle| {
            let mut size: usize = 0;
            // Null buffer: the call only reports the stored length.
            let ret =
                unsafe { nvs_get_blob(handle, LIST_KEY.as_ptr(), core::ptr::null_mut(), &mut size) };
            if ret != ESP_OK {
                return Err(ret);
            }
            if size == 0 || size > MAX_BLOB_SIZE {
                return Err(ESP_ERR_NVS_INVALID_LENGTH);
            }

            let mut buf = vec![0u8; size];
            let ret = unsafe {
                nvs_get_blob(handle, LIST_KEY.as_ptr(), buf.as_mut_ptr().cast(), &mut size)
            };
            if ret != ESP_OK {
                return Err(ret);
            }
            buf.truncate(size);
            Ok(buf)
        });

        match result {
            Ok(bytes) => Ok(Some(bytes)),
            // A namespace that was never written cannot be opened read-only.
            Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Ok(None),
            Err(e) if e == ESP_ERR_NVS_INVALID_LENGTH => Err(StorageError::Corrupted),
            Err(e) => {
                warn!("NvsAdapter: reading {LIST_KEY:?} failed ({e})");
                Err(StorageError::IoError)
            }
        }
    }

    #[cfg(target_os = "espidf")]
    fn write_blob(&self, bytes: &[u8]) -> Result<(), StorageError> {
        if bytes.len() > MAX_BLOB_SIZE {
            return Err(StorageError::Full);
        }
        let _io = self.io.lock().unwrap_or_else(PoisonError::into_inner);
        let result = Self::with_list_namespace(true, |handle| {
            let ret =
                unsafe { nvs_set_blob(handle, LIST_KEY.as_ptr(), bytes.as_ptr().cast(), bytes.len()) };
            if ret != ESP_OK {
                return Err(ret);
            }
            let ret = unsafe { nvs_commit(handle) };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(())
        });
        match result {
            Ok(()) => Ok(()),
            Err(e) if e == ESP_ERR_NVS_NOT_ENOUGH_SPACE => Err(StorageError::Full),
            Err(e) => {
                warn!("NvsAdapter: writing {LIST_KEY:?} failed ({e})");
                Err(StorageError::IoError)
            }
        }
    }

    #[cfg(not(target_os = "espidf"))]
    #[allow(clippy::unnecessary_wraps)]
    fn read_blob(&self) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.blob.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    #[cfg(not(target_os = "espidf"))]
    #[allow(clippy::unnecessary_wraps)]
    fn write_blob(&self, bytes: &[u8]) -> Result<(), StorageError> {
        *self.blob.lock().unwrap_or_else(PoisonError::into_inner) = Some(bytes.to_vec());
        Ok(())
    }
}

impl NetworkListStore for NvsAdapter {
    fn load(&self) -> Result<Vec<NetworkProfile>, StorageError> {
        match self.read_blob()? {
            Some(bytes) => {
                let networks = decode_blob(&bytes)?;
                info!(
                    "NvsAdapter: loaded {} saved networks ({} bytes)",
                    networks.len(),
                    bytes.len()
                );
                Ok(networks)
            }
            None => {
                info!("NvsAdapter: no saved networks");
                Ok(Vec::new())
            }
        }
    }

    fn save(&self, networks: &[NetworkProfile]) -> Result<(), StorageError> {
        let bytes = encode_blob(networks)?;
        self.write_blob(&bytes)?;
        info!(
            "NvsAdapter: saved {} networks ({} bytes)",
            networks.len(),
            bytes.len()
        );
        Ok(())
    }
}
