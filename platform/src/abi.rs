// SPDX-FileCopyrightText: 2025 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! The calling contract between the host executable and a hot-reloadable game
//! module.
//!
//! A game module is a dynamic library exporting exactly two functions:
//! [`CREATE_SYMBOL`] (a [`CreateFn`]) and [`DESTROY_SYMBOL`] (a
//! [`DestroyFn`]). Game crates should not write these by hand, but implement
//! [`Game`] and use [`export_game!`](crate::export_game) instead.
//!
//! Everything crossing the boundary is `#[repr(C)]` and the functions use the
//! C calling convention, since the host and the module are separately
//! compiled artifacts and Rust's own ABI is not stable between them.

use alloc::boxed::Box;
use core::{ffi::c_void, ptr};

/// The name of the constructor every game module must export.
pub const CREATE_SYMBOL: &str = "create";

/// The name of the destructor every game module must export.
pub const DESTROY_SYMBOL: &str = "destroy";

/// Constructs a game instance. Returns null if the game could not be created.
///
/// The [`HostContext`] outlives the returned instance.
pub type CreateFn = unsafe extern "C" fn(host: *mut HostContext) -> *mut GameInstance;

/// Destroys an instance previously returned by the same module's
/// [`CreateFn`].
pub type DestroyFn = unsafe extern "C" fn(instance: *mut GameInstance);

/// Severity of a message passed to [`HostContext::log`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LogLevel {
    #[allow(missing_docs)]
    Error,
    #[allow(missing_docs)]
    Warn,
    #[allow(missing_docs)]
    Info,
    #[allow(missing_docs)]
    Debug,
    #[allow(missing_docs)]
    Trace,
}

/// Services the host provides to game modules. Owned by the host, which keeps
/// it at a stable address for as long as any game instance is alive.
#[repr(C)]
pub struct HostContext {
    /// Host-side state, passed back as the first parameter of every function
    /// in this struct.
    pub user_data: *mut c_void,
    /// Writes `len` bytes of UTF-8 at `message` into the host's log.
    pub log: unsafe extern "C" fn(
        user_data: *mut c_void,
        level: LogLevel,
        message: *const u8,
        len: usize,
    ),
    /// Starts playing the sound registered under the `len` bytes of UTF-8 at
    /// `name` from the start. Returns false if there's no such sound.
    pub play_sound: unsafe extern "C" fn(
        user_data: *mut c_void,
        name: *const u8,
        len: usize,
        looped: bool,
    ) -> bool,
}

/// The header of every game instance. The module allocates the instance with
/// this as its first field, so the host can drive it without knowing anything
/// else about its layout.
#[repr(C)]
pub struct GameInstance {
    /// Runs one frame of the game.
    pub run_frame: unsafe extern "C" fn(instance: *mut GameInstance, host: *mut HostContext),
}

/// Safe view into a [`HostContext`] for game code.
#[derive(Clone, Copy)]
pub struct Host<'a> {
    context: &'a HostContext,
}

impl<'a> Host<'a> {
    /// Wraps a host context.
    ///
    /// ### Safety
    ///
    /// The function pointers in `context` must be valid to call with its
    /// `user_data` for the lifetime `'a`. The host upholds this for the
    /// contexts it passes into modules.
    pub unsafe fn new(context: &'a HostContext) -> Host<'a> {
        Host { context }
    }

    /// Writes a message into the host's log.
    pub fn log(&self, level: LogLevel, message: &str) {
        // Safety: validity of the function and user data was promised in
        // Host::new, and the message pointer and length come from a live &str.
        unsafe {
            (self.context.log)(self.context.user_data, level, message.as_ptr(), message.len());
        }
    }

    /// Plays the sound registered under `name` from the start, returning
    /// false if the host has no such sound.
    pub fn play_sound(&self, name: &str, looped: bool) -> bool {
        // Safety: see Host::log.
        unsafe {
            (self.context.play_sound)(self.context.user_data, name.as_ptr(), name.len(), looped)
        }
    }
}

/// The Rust side of a game module, exported to the host with
/// [`export_game!`](crate::export_game).
pub trait Game: Sized {
    /// Creates the game. Returning None makes the host's reload fail.
    fn create(host: Host) -> Option<Self>;

    /// Runs one frame of the game.
    fn run_frame(&mut self, host: Host);
}

#[repr(C)]
struct Instance<G> {
    header: GameInstance,
    game: G,
}

unsafe extern "C" fn run_frame_impl<G: Game>(instance: *mut GameInstance, host: *mut HostContext) {
    // Safety: the host only calls run_frame with pointers returned by
    // create_instance::<G> and its own live context, and Instance<G> is
    // repr(C) with the header as the first field.
    let (instance, host) = unsafe { (&mut *(instance as *mut Instance<G>), host.as_ref()) };
    if let Some(host) = host {
        // Safety: the host context is valid while the host calls into us.
        instance.game.run_frame(unsafe { Host::new(host) });
    }
}

/// The implementation behind the [`CREATE_SYMBOL`] generated by
/// [`export_game!`](crate::export_game).
///
/// ### Safety
///
/// `host` must be null or point to a valid [`HostContext`].
pub unsafe fn create_instance<G: Game>(host: *mut HostContext) -> *mut GameInstance {
    // Safety: guaranteed by the caller.
    let Some(host) = (unsafe { host.as_ref() }) else {
        return ptr::null_mut();
    };
    // Safety: guaranteed by the caller.
    let Some(game) = G::create(unsafe { Host::new(host) }) else {
        return ptr::null_mut();
    };
    let instance = Box::new(Instance {
        header: GameInstance {
            run_frame: run_frame_impl::<G>,
        },
        game,
    });
    Box::into_raw(instance) as *mut GameInstance
}

/// The implementation behind the [`DESTROY_SYMBOL`] generated by
/// [`export_game!`](crate::export_game).
///
/// ### Safety
///
/// `instance` must be null or a pointer returned by [`create_instance`] with
/// the same `G`, which has not been destroyed yet.
pub unsafe fn destroy_instance<G: Game>(instance: *mut GameInstance) {
    if !instance.is_null() {
        // Safety: guaranteed by the caller, the pointer came from
        // Box::into_raw of an Instance<G>.
        drop(unsafe { Box::from_raw(instance as *mut Instance<G>) });
    }
}

/// Exports the `create` and `destroy` functions for the given [`Game`]
/// implementation, making the crate loadable by the host when built as a
/// `cdylib`.
#[macro_export]
macro_rules! export_game {
    ($game_type:ty) => {
        /// Game module constructor, called by the host.
        ///
        /// ### Safety
        ///
        /// `host` must be null or point to a valid host context.
        #[no_mangle]
        pub unsafe extern "C" fn create(
            host: *mut $crate::abi::HostContext,
        ) -> *mut $crate::abi::GameInstance {
            unsafe { $crate::abi::create_instance::<$game_type>(host) }
        }

        /// Game module destructor, called by the host.
        ///
        /// ### Safety
        ///
        /// `instance` must have been returned by `create`.
        #[no_mangle]
        pub unsafe extern "C" fn destroy(instance: *mut $crate::abi::GameInstance) {
            unsafe { $crate::abi::destroy_instance::<$game_type>(instance) }
        }
    };
}
