//! # Priority Mapping
//!
//! A pool's priority is a normalized value in `[-1.0, 1.0]`:
//!
//! | Value | Scheduling class |
//! |-------|------------------|
//! | `0.0` | Default OS scheduling, nothing applied |
//! | `(0.0, 1.0]` | Real-time, scaled across the OS real-time range |
//! | `[-1.0, 0.0)` | Background, scaled across the OS background range |
//!
//! Scaling is linear between the mildest and strongest native level, so a
//! larger normalized value never maps to a lower effective priority.

use std::io;

/// Native scheduling class selected by [`map_priority`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedClass {
    /// Default time-sharing scheduling
    Normal,
    /// Real-time round-robin scheduling
    RealTime,
    /// Reduced-priority background scheduling
    Background,
}

/// A concrete native priority: class plus level within that class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativePriority {
    /// Scheduling class
    pub class: SchedClass,
    /// Level within the class: `SCHED_RR` priority, nice value, or Windows
    /// thread priority depending on platform and class
    pub level: i32,
}

impl NativePriority {
    /// Default OS scheduling.
    pub const NORMAL: NativePriority = NativePriority {
        class: SchedClass::Normal,
        level: 0,
    };

    /// Returns true if applying this priority is a no-op.
    #[must_use]
    pub fn is_normal(&self) -> bool {
        self.class == SchedClass::Normal
    }
}

/// Native level ranges for the non-default classes.
///
/// Each range runs from its mildest level (`*_min`) to its strongest
/// (`*_max`); for nice values the strongest background level is the
/// numerically largest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityBounds {
    /// Mildest real-time level
    pub realtime_min: i32,
    /// Strongest real-time level
    pub realtime_max: i32,
    /// Mildest background level
    pub background_min: i32,
    /// Strongest background level
    pub background_max: i32,
}

impl PriorityBounds {
    /// Queries the host for its priority ranges.
    #[must_use]
    pub fn detect() -> Self {
        #[cfg(unix)]
        {
            // SAFETY: sched_get_priority_{min,max} only read a policy constant.
            #[allow(unsafe_code)]
            let (min, max) = unsafe {
                (
                    libc::sched_get_priority_min(libc::SCHED_RR),
                    libc::sched_get_priority_max(libc::SCHED_RR),
                )
            };
            let defaults = Self::default();
            let (realtime_min, realtime_max) = if min < 0 || max < min {
                tracing::debug!(
                    "SCHED_RR range unavailable, using {}..{}",
                    defaults.realtime_min,
                    defaults.realtime_max
                );
                (defaults.realtime_min, defaults.realtime_max)
            } else {
                (min, max)
            };
            Self {
                realtime_min,
                realtime_max,
                ..defaults
            }
        }

        #[cfg(not(unix))]
        {
            Self::default()
        }
    }
}

impl Default for PriorityBounds {
    #[cfg(windows)]
    fn default() -> Self {
        // THREAD_PRIORITY_ABOVE_NORMAL..TIME_CRITICAL, BELOW_NORMAL..IDLE
        Self {
            realtime_min: 1,
            realtime_max: 15,
            background_min: -1,
            background_max: -15,
        }
    }

    #[cfg(not(windows))]
    fn default() -> Self {
        // SCHED_RR 1..99, nice 1..19
        Self {
            realtime_min: 1,
            realtime_max: 99,
            background_min: 1,
            background_max: 19,
        }
    }
}

/// Maps a normalized priority onto a native class and level.
///
/// Values outside `[-1.0, 1.0]` are clamped; NaN maps to normal scheduling.
#[must_use]
pub fn map_priority(priority: f64, bounds: &PriorityBounds) -> NativePriority {
    if priority.is_nan() || priority == 0.0 {
        return NativePriority::NORMAL;
    }
    let priority = priority.clamp(-1.0, 1.0);
    if priority > 0.0 {
        NativePriority {
            class: SchedClass::RealTime,
            level: interpolate(priority, bounds.realtime_min, bounds.realtime_max),
        }
    } else {
        NativePriority {
            class: SchedClass::Background,
            level: interpolate(-priority, bounds.background_min, bounds.background_max),
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn interpolate(fraction: f64, mildest: i32, strongest: i32) -> i32 {
    let span = f64::from(strongest) - f64::from(mildest);
    (f64::from(mildest) + fraction * span).round() as i32
}

/// Applies `priority` to the calling thread.
///
/// # Errors
///
/// Returns the OS error (typically `PermissionDenied` for real-time classes
/// without privileges), or [`io::ErrorKind::Unsupported`] when the platform
/// has no equivalent of the class.
pub fn apply_current_thread(priority: &NativePriority) -> io::Result<()> {
    match priority.class {
        SchedClass::Normal => Ok(()),
        SchedClass::RealTime => apply_realtime(priority.level),
        SchedClass::Background => apply_background(priority.level),
    }
}

#[cfg(unix)]
fn apply_realtime(level: i32) -> io::Result<()> {
    // SAFETY: sched_param is plain data and fully initialized before use;
    // pthread_self() is always a valid handle for the calling thread.
    #[allow(unsafe_code)]
    let rc = unsafe {
        let mut param: libc::sched_param = std::mem::zeroed();
        param.sched_priority = level;
        libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_RR, &param)
    };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::from_raw_os_error(rc))
    }
}

#[cfg(target_os = "linux")]
fn apply_background(level: i32) -> io::Result<()> {
    // SCHED_BATCH needs no privileges and only accepts priority 0
    // SAFETY: see apply_realtime.
    #[allow(unsafe_code)]
    let batch = unsafe {
        let param: libc::sched_param = std::mem::zeroed();
        libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_BATCH, &param)
    };
    if batch != 0 {
        tracing::debug!(
            "SCHED_BATCH refused: {}",
            io::Error::from_raw_os_error(batch)
        );
    }

    // SAFETY: gettid has no preconditions; setpriority on our own tid only
    // changes the nice value of the calling thread.
    #[allow(unsafe_code)]
    let rc = unsafe {
        let tid = libc::syscall(libc::SYS_gettid);
        let tid = libc::id_t::try_from(tid).map_err(|_| io::Error::from(io::ErrorKind::Other))?;
        libc::setpriority(libc::PRIO_PROCESS, tid, level)
    };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(all(unix, not(target_os = "linux")))]
fn apply_background(_level: i32) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "per-thread background priority is not supported on this platform",
    ))
}

#[cfg(windows)]
fn apply_realtime(level: i32) -> io::Result<()> {
    set_windows_priority(level)
}

#[cfg(windows)]
fn apply_background(level: i32) -> io::Result<()> {
    set_windows_priority(level)
}

#[cfg(windows)]
fn set_windows_priority(level: i32) -> io::Result<()> {
    use winapi::um::processthreadsapi::{GetCurrentThread, SetThreadPriority};

    // SetThreadPriority only accepts the named THREAD_PRIORITY_* values
    let bucket = match level {
        l if l >= 15 => 15,
        l if l >= 2 => 2,
        l if l >= 1 => 1,
        l if l <= -15 => -15,
        l if l <= -2 => -2,
        _ => -1,
    };

    // SAFETY: GetCurrentThread returns a pseudo-handle that doesn't need to
    // be closed, and `bucket` is one of the documented priority values.
    #[allow(unsafe_code)]
    let ok = unsafe { SetThreadPriority(GetCurrentThread(), bucket) };
    if ok == 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

#[cfg(not(any(unix, windows)))]
fn apply_realtime(_level: i32) -> io::Result<()> {
    Err(io::Error::from(io::ErrorKind::Unsupported))
}

#[cfg(not(any(unix, windows)))]
fn apply_background(_level: i32) -> io::Result<()> {
    Err(io::Error::from(io::ErrorKind::Unsupported))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linux_like() -> PriorityBounds {
        PriorityBounds {
            realtime_min: 1,
            realtime_max: 99,
            background_min: 1,
            background_max: 19,
        }
    }

    /// Orders native priorities by how much CPU preference they express.
    fn effective_rank(p: NativePriority, bounds: &PriorityBounds) -> i64 {
        let toward = |level: i32, min: i32, max: i32| -> i64 {
            i64::from((level - min) * (max - min).signum())
        };
        match p.class {
            SchedClass::Normal => 0,
            SchedClass::RealTime => {
                1 + toward(p.level, bounds.realtime_min, bounds.realtime_max)
            }
            SchedClass::Background => {
                -1 - toward(p.level, bounds.background_min, bounds.background_max)
            }
        }
    }

    #[test]
    fn test_zero_is_normal() {
        let p = map_priority(0.0, &linux_like());
        assert_eq!(p, NativePriority::NORMAL);
        assert!(p.is_normal());
        assert!(apply_current_thread(&p).is_ok());
    }

    #[test]
    fn test_realtime_interpolation() {
        let bounds = linux_like();
        assert_eq!(
            map_priority(0.5, &bounds),
            NativePriority {
                class: SchedClass::RealTime,
                level: 50,
            }
        );
        assert_eq!(map_priority(1.0, &bounds).level, 99);
        assert_eq!(map_priority(0.001, &bounds).level, 1);
    }

    #[test]
    fn test_background_interpolation() {
        let bounds = linux_like();
        let p = map_priority(-1.0, &bounds);
        assert_eq!(p.class, SchedClass::Background);
        assert_eq!(p.level, 19);
        assert_eq!(map_priority(-0.5, &bounds).level, 10);
    }

    #[test]
    fn test_windows_like_bounds() {
        let bounds = PriorityBounds {
            realtime_min: 1,
            realtime_max: 15,
            background_min: -1,
            background_max: -15,
        };
        assert_eq!(map_priority(1.0, &bounds).level, 15);
        assert_eq!(map_priority(-1.0, &bounds).level, -15);
        assert_eq!(map_priority(-0.5, &bounds).level, -8);
    }

    #[test]
    fn test_mapping_is_monotonic() {
        for bounds in [linux_like(), PriorityBounds::default(), PriorityBounds::detect()] {
            let mut previous = i64::MIN;
            for step in -100..=100 {
                let priority = f64::from(step) / 100.0;
                let rank = effective_rank(map_priority(priority, &bounds), &bounds);
                assert!(rank >= previous, "priority {priority} ranked lower than its predecessor");
                previous = rank;
            }
        }
    }

    #[test]
    fn test_out_of_range_clamped() {
        let bounds = linux_like();
        assert_eq!(map_priority(7.0, &bounds), map_priority(1.0, &bounds));
        assert_eq!(map_priority(f64::NAN, &bounds), NativePriority::NORMAL);
    }
}
