// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Manage APT software sources through a privileged helper.
//!
//! Source files under `/etc/apt/sources.list.d` are owned by root, yet
//! desktop users expect to add a PPA or toggle a component without opening a
//! root shell. Repoman splits the job in two:
//!
//! - A privileged helper that owns the bus name `ro.santopiet.repoman`. It
//!   is the only process that writes source files, and it checks every remote
//!   caller against polkit before touching anything.
//! - An unprivileged client that reads source files directly, and forwards
//!   every mutation to the helper over the bus.
//!
//! # Source Files
//!
//! Sources are stored in the deb822 format, one `.sources` file per source.
//! Older one-line sources.list entries and PPA shortcuts are still accepted
//! as input, but are always persisted as deb822. One file is designated the
//! __system source__, i.e., the distribution's own archive. It is the implicit
//! target of the component and pocket toggles, and can never be removed.
//!
//! # See Also
//!
//! 1. [sources.list(5)](https://manpages.debian.org/stable/apt/sources.list.5.en.html)
//! 2. [polkit(8)](https://www.freedesktop.org/software/polkit/docs/latest/polkit.8.html)

pub mod audit;
pub mod auth;
pub mod client;
pub mod config;
pub mod dbus;
pub mod distro;
pub mod path;
pub mod service;
pub mod source;
pub mod store;
