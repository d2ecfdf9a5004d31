//! Cross-core bring-up alignment
//!
//! Used once at start-up, before any transfer is enabled. The waiting side spins on the
//! flag; there is no timeout.

use crate::driver::peripheral::Handshake;

/// Signals the peer core that the local side is ready.
pub fn announce<H: Handshake>(flag: &mut H) {
    flag.raise();
    debug!("handshake raised");
}

/// Spins until the peer raises the flag, then acknowledges it.
///
/// Returns the number of polls that found the flag low.
pub fn wait_for_peer<H: Handshake>(flag: &mut H) -> u32 {
    let mut polls: u32 = 0;
    while !flag.is_raised() {
        polls = polls.wrapping_add(1);
        core::hint::spin_loop();
    }
    flag.acknowledge();
    info!("peer core aligned after {} polls", polls);
    polls
}
