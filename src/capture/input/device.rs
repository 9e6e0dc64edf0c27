//! Input device access
//!
//! `InputBackend` enumerates and opens devices, `InputDevice` reads from one.
//! The production backend talks to `/dev/input/event*` through the `evdev`
//! crate; the reader multiplexes all open descriptors with `poll(2)`.

use crate::capture::input::keycodes;
use crate::capture::input::types::{DeviceCapabilities, RawEvent};
use evdev::{Device, EventType, InputEventKind, Key, RelativeAxisType};
use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use std::io;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::path::{Path, PathBuf};
use std::time::Duration;

const INPUT_DIR: &str = "/dev/input";

/// An open input device
pub trait InputDevice: Send {
    fn path(&self) -> &Path;

    fn name(&self) -> &str;

    fn capabilities(&self) -> DeviceCapabilities;

    /// Descriptor watched by the reader's multiplexed wait
    fn as_fd(&self) -> BorrowedFd<'_>;

    /// Drain everything currently readable. Returns an empty batch when
    /// nothing is pending.
    fn read(&mut self) -> io::Result<Vec<RawEvent>>;
}

/// Enumerates and opens input devices
pub trait InputBackend: Send + Sync {
    fn list(&self) -> io::Result<Vec<PathBuf>>;

    /// Fails with `PermissionDenied` or `NotFound` for inaccessible devices
    fn open(&self, path: &Path) -> io::Result<Box<dyn InputDevice>>;
}

/// Block until at least one device is readable or `timeout` elapses.
///
/// Returns the indices of ready devices. Error and hang-up conditions count
/// as ready so the subsequent read surfaces the failure.
pub fn wait_readable(devices: &[Box<dyn InputDevice>], timeout: Duration) -> io::Result<Vec<usize>> {
    if devices.is_empty() {
        std::thread::sleep(timeout);
        return Ok(Vec::new());
    }

    let mut fds: Vec<PollFd<'_>> = devices
        .iter()
        .map(|device| PollFd::new(device.as_fd(), PollFlags::POLLIN))
        .collect();

    let millis = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);
    match poll(&mut fds, PollTimeout::from(millis)) {
        Ok(0) | Err(Errno::EINTR) => return Ok(Vec::new()),
        Ok(_) => {}
        Err(errno) => return Err(io::Error::from(errno)),
    }

    let wake = PollFlags::POLLIN | PollFlags::POLLERR | PollFlags::POLLHUP | PollFlags::POLLNVAL;
    Ok(fds
        .iter()
        .enumerate()
        .filter(|(_, fd)| fd.revents().map_or(false, |revents| revents.intersects(wake)))
        .map(|(index, _)| index)
        .collect())
}

/// evdev-backed device source
#[derive(Debug, Default)]
pub struct EvdevBackend;

impl InputBackend for EvdevBackend {
    fn list(&self) -> io::Result<Vec<PathBuf>> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(INPUT_DIR)?
            .flatten()
            .filter(|entry| entry.file_name().to_string_lossy().starts_with("event"))
            .map(|entry| entry.path())
            .collect();
        paths.sort();
        Ok(paths)
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn InputDevice>> {
        Ok(Box::new(EvdevDevice::open(path)?))
    }
}

pub struct EvdevDevice {
    path: PathBuf,
    name: String,
    device: Device,
}

impl EvdevDevice {
    pub fn open(path: &Path) -> io::Result<Self> {
        let device = Device::open(path)?;
        set_nonblocking(&device)?;
        let name = device.name().unwrap_or("unknown").to_string();
        Ok(Self {
            path: path.to_path_buf(),
            name,
            device,
        })
    }
}

impl InputDevice for EvdevDevice {
    fn path(&self) -> &Path {
        &self.path
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> DeviceCapabilities {
        DeviceCapabilities {
            pointer: self.device.supported_events().contains(EventType::RELATIVE),
            keys: self
                .device
                .supported_keys()
                .map_or(false, |keys| keys.contains(Key::KEY_A)),
        }
    }

    fn as_fd(&self) -> BorrowedFd<'_> {
        // SAFETY: the descriptor is owned by `self.device` and stays open for
        // as long as the returned borrow lives.
        unsafe { BorrowedFd::borrow_raw(self.device.as_raw_fd()) }
    }

    fn read(&mut self) -> io::Result<Vec<RawEvent>> {
        let mut records = Vec::new();
        loop {
            let events = match self.device.fetch_events() {
                Ok(events) => events,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if records.is_empty() => return Err(err),
                Err(err) => {
                    tracing::debug!("Partial read from {}: {}", self.name, err);
                    break;
                }
            };

            let mut fetched = 0usize;
            for event in events {
                fetched += 1;
                if let Some(raw) = classify(event.kind(), event.value()) {
                    records.push(raw);
                }
            }
            if fetched == 0 {
                break;
            }
        }
        Ok(records)
    }
}

fn classify(kind: InputEventKind, value: i32) -> Option<RawEvent> {
    match kind {
        InputEventKind::RelAxis(axis) if axis == RelativeAxisType::REL_X => {
            Some(RawEvent::PointerDelta { dx: value, dy: 0 })
        }
        InputEventKind::RelAxis(axis) if axis == RelativeAxisType::REL_Y => {
            Some(RawEvent::PointerDelta { dx: 0, dy: value })
        }
        InputEventKind::Key(key) => {
            // 2 = auto-repeat
            let down = match value {
                0 => false,
                1 => true,
                _ => return None,
            };
            let code = key.code();
            if keycodes::is_button(code) {
                Some(RawEvent::ButtonTransition { code, down })
            } else {
                Some(RawEvent::KeyTransition { code, down })
            }
        }
        _ => None,
    }
}

/// Whether a read error means the device node went away for good.
pub fn is_device_gone(err: &io::Error) -> bool {
    err.raw_os_error() == Some(Errno::ENODEV as i32)
}

fn set_nonblocking(device: &Device) -> io::Result<()> {
    let flags = OFlag::from_bits_truncate(fcntl(device.as_raw_fd(), FcntlArg::F_GETFL)?);
    fcntl(device.as_raw_fd(), FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory devices backed by socket pairs so `poll(2)` sees real
    //! readiness.

    use super::*;
    use parking_lot::Mutex;
    use std::collections::{HashMap, VecDeque};
    use std::io::{Read, Write};
    use std::os::fd::AsFd;
    use std::os::unix::net::UnixStream;
    use std::sync::Arc;

    pub struct FakeDevice {
        path: PathBuf,
        name: String,
        caps: DeviceCapabilities,
        wake: UnixStream,
        pending: Arc<Mutex<VecDeque<RawEvent>>>,
        fail_next: Arc<Mutex<bool>>,
        unplugged: Arc<Mutex<bool>>,
    }

    /// Test-side handle used to inject events into an opened `FakeDevice`
    #[derive(Clone)]
    pub struct FakeHandle {
        wake: Arc<Mutex<UnixStream>>,
        pending: Arc<Mutex<VecDeque<RawEvent>>>,
        fail_next: Arc<Mutex<bool>>,
        unplugged: Arc<Mutex<bool>>,
    }

    impl FakeHandle {
        pub fn push(&self, event: RawEvent) {
            self.pending.lock().push_back(event);
            let _ = self.wake.lock().write_all(&[1]);
        }

        pub fn fail_next_read(&self) {
            *self.fail_next.lock() = true;
            let _ = self.wake.lock().write_all(&[1]);
        }

        /// Every later read fails with ENODEV while the descriptor stays
        /// readable, like a hot-unplugged evdev node.
        pub fn unplug(&self) {
            *self.unplugged.lock() = true;
            let _ = self.wake.lock().write_all(&[1]);
        }
    }

    pub fn device(path: &str, name: &str, caps: DeviceCapabilities) -> (FakeDevice, FakeHandle) {
        let (rx, tx) = UnixStream::pair().expect("socket pair");
        rx.set_nonblocking(true).expect("nonblocking");
        let pending = Arc::new(Mutex::new(VecDeque::new()));
        let fail_next = Arc::new(Mutex::new(false));
        let unplugged = Arc::new(Mutex::new(false));
        (
            FakeDevice {
                path: PathBuf::from(path),
                name: name.to_string(),
                caps,
                wake: rx,
                pending: pending.clone(),
                fail_next: fail_next.clone(),
                unplugged: unplugged.clone(),
            },
            FakeHandle {
                wake: Arc::new(Mutex::new(tx)),
                pending,
                fail_next,
                unplugged,
            },
        )
    }

    impl InputDevice for FakeDevice {
        fn path(&self) -> &Path {
            &self.path
        }

        fn name(&self) -> &str {
            &self.name
        }

        fn capabilities(&self) -> DeviceCapabilities {
            self.caps
        }

        fn as_fd(&self) -> BorrowedFd<'_> {
            self.wake.as_fd()
        }

        fn read(&mut self) -> io::Result<Vec<RawEvent>> {
            if *self.unplugged.lock() {
                return Err(io::Error::from_raw_os_error(Errno::ENODEV as i32));
            }
            // Fail before draining the wake bytes so the descriptor stays
            // readable and the next cycle picks the pending events up.
            if std::mem::take(&mut *self.fail_next.lock()) {
                return Err(io::Error::new(io::ErrorKind::Other, "device glitch"));
            }
            let mut buf = [0u8; 64];
            while let Ok(n) = self.wake.read(&mut buf) {
                if n == 0 {
                    break;
                }
            }
            Ok(self.pending.lock().drain(..).collect())
        }
    }

    enum Entry {
        Ready(FakeDevice),
        Fails(io::ErrorKind),
    }

    #[derive(Default)]
    pub struct FakeBackend {
        entries: Mutex<HashMap<PathBuf, Entry>>,
        order: Mutex<Vec<PathBuf>>,
    }

    impl FakeBackend {
        pub fn with_device(self, device: FakeDevice) -> Self {
            let path = device.path.clone();
            self.order.lock().push(path.clone());
            self.entries.lock().insert(path, Entry::Ready(device));
            self
        }

        pub fn with_failing(self, path: &str, kind: io::ErrorKind) -> Self {
            let path = PathBuf::from(path);
            self.order.lock().push(path.clone());
            self.entries.lock().insert(path, Entry::Fails(kind));
            self
        }
    }

    impl InputBackend for FakeBackend {
        fn list(&self) -> io::Result<Vec<PathBuf>> {
            Ok(self.order.lock().clone())
        }

        fn open(&self, path: &Path) -> io::Result<Box<dyn InputDevice>> {
            match self.entries.lock().remove(path) {
                Some(Entry::Ready(device)) => Ok(Box::new(device)),
                Some(Entry::Fails(kind)) => Err(io::Error::new(kind, "fake open failure")),
                None => Err(io::Error::new(io::ErrorKind::NotFound, "no such device")),
            }
        }
    }
}
