//! Readiness backends.
//!
//! Exactly one `Selector` is compiled in, picked by target with priority
//! event ports > epoll > kqueue > select. All backends present the same
//! level-triggered surface to the loop; `select` doubles as the portable
//! fallback and can be forced on any target with
//! `RUSTFLAGS="--cfg evio_force_select"`.

#[cfg(not(unix))]
compile_error!("evio only supports unix targets");

#[allow(unused_macros)]
macro_rules! syscall {
    ($fn: ident ( $($arg: expr),* $(,)* ) ) => {{
        let res = unsafe { libc::$fn($($arg, )*) };
        if res == -1 {
            Err(std::io::Error::last_os_error())
        } else {
            Ok(res)
        }
    }};
}

#[cfg(all(
    not(evio_force_select),
    any(target_os = "illumos", target_os = "solaris")
))]
mod evport;

#[cfg(all(
    not(evio_force_select),
    any(target_os = "illumos", target_os = "solaris")
))]
pub(crate) use self::evport::Selector;

#[cfg(all(
    not(evio_force_select),
    any(target_os = "android", target_os = "linux")
))]
mod epoll;

#[cfg(all(
    not(evio_force_select),
    any(target_os = "android", target_os = "linux")
))]
pub(crate) use self::epoll::Selector;

#[cfg(all(
    not(evio_force_select),
    any(
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "ios",
        target_os = "macos",
        target_os = "netbsd",
        target_os = "openbsd",
        target_os = "tvos",
        target_os = "watchos",
    )
))]
mod kqueue;

#[cfg(all(
    not(evio_force_select),
    any(
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "ios",
        target_os = "macos",
        target_os = "netbsd",
        target_os = "openbsd",
        target_os = "tvos",
        target_os = "watchos",
    )
))]
pub(crate) use self::kqueue::Selector;

#[cfg(all(
    unix,
    any(
        evio_force_select,
        not(any(
            target_os = "android",
            target_os = "dragonfly",
            target_os = "freebsd",
            target_os = "illumos",
            target_os = "ios",
            target_os = "linux",
            target_os = "macos",
            target_os = "netbsd",
            target_os = "openbsd",
            target_os = "solaris",
            target_os = "tvos",
            target_os = "watchos",
        ))
    )
))]
mod select;

#[cfg(all(
    unix,
    any(
        evio_force_select,
        not(any(
            target_os = "android",
            target_os = "dragonfly",
            target_os = "freebsd",
            target_os = "illumos",
            target_os = "ios",
            target_os = "linux",
            target_os = "macos",
            target_os = "netbsd",
            target_os = "openbsd",
            target_os = "solaris",
            target_os = "tvos",
            target_os = "watchos",
        ))
    )
))]
pub(crate) use self::select::Selector;
