//! Read-only decoder and navigator for ext2/ext3/ext4 filesystem images.
//!
//! The entry point is [`Volume::open`], which validates the superblock and
//! group descriptor table of an [`image::ImageSource`] (a plain file via
//! [`image::FileImage`], or an in-memory range via [`image::MemoryImage`]).
//! From there, [`Volume::root`] / [`Volume::by_path`] / [`Volume::by_inode`]
//! hand back [`volume::FileEntry`] handles for reading file content,
//! enumerating directory children, and reading extended attributes and
//! symlink targets.
//!
//! Module layout follows the on-disk structure leaves-first: [`image`] and
//! [`cache`] are the byte-addressed substrate; [`superblock`], [`group`],
//! and [`inode`] decode the fixed-layout metadata; [`extent`] and
//! [`indirect`] resolve logical-to-physical block addressing; [`filedata`],
//! [`dirent`], [`xattr`], and [`symlink`] build on those to present file
//! content, directories, attributes, and link targets; [`path`] and
//! [`volume`] tie everything together behind the public facade. [`shared`]
//! adds an `Arc<Mutex<Volume>>`-backed handle for callers that need to move
//! a volume across threads or hold more than one owner of it.

pub mod cache;
pub mod dirent;
pub mod error;
pub mod extent;
pub mod features;
pub mod filedata;
pub mod group;
pub mod image;
pub mod indirect;
pub mod inode;
pub mod path;
pub mod shared;
pub mod superblock;
pub mod symlink;
pub mod volume;
pub mod xattr;

pub use error::{Error, FeatureSet, Result};
pub use image::{BoundedImage, FileImage, ImageSource, MemoryImage};
pub use inode::EntryKind;
pub use shared::SharedVolume;
pub use superblock::Superblock;
pub use volume::{Child, ChildrenIter, FileEntry, GetResult, Volume, VolumeOptions};
pub use xattr::ExtendedAttribute;
