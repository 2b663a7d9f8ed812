/// Check whether a process with the given pid exists.
///
/// A permission error still means the process is there.
#[cfg(unix)]
pub fn process_exists(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    // pid 0 would address our own process group
    if raw <= 0 {
        return false;
    }

    // kill(pid, 0) performs the permission and existence checks without signalling
    if unsafe { libc::kill(raw, 0) } == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

// No probe available; never report an exit we cannot observe
#[cfg(not(unix))]
pub fn process_exists(_pid: u32) -> bool {
    true
}
