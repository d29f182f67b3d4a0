//! Linux magnetic tape driver ioctl definitions.
//!
//! from: /usr/include/x86_64-linux-gnu/sys/mtio.h, see also: man 4 st

#[repr(C)]
pub struct Mtop {
    pub mt_op: i16,
    pub mt_count: libc::c_int,
}

pub const MTFSF: i16 = 1; // forward space over filemark
pub const MTBSF: i16 = 2; // backward space over filemark
pub const MTFSR: i16 = 3; // forward space record (block)
pub const MTBSR: i16 = 4; // backward space record (block)
pub const MTWEOF: i16 = 5; // write filemark
pub const MTREW: i16 = 6; // rewind
pub const MTNOP: i16 = 8; // no-op, refresh status
pub const MTEOM: i16 = 12; // goto end of recorded media

// #define MTIOCTOP _IOW('m', 1, struct mtop)
nix::ioctl_write_ptr!(mtioctop, b'm', 1, Mtop);

#[derive(Default, Debug)]
#[repr(C)]
pub struct Mtget {
    pub mt_type: libc::c_long,
    pub mt_resid: libc::c_long,
    pub mt_dsreg: libc::c_long,
    pub mt_gstat: libc::c_long,
    pub mt_erreg: libc::c_long,
    pub mt_fileno: i32,
    pub mt_blkno: i32,
}

// #define MTIOCGET _IOR('m', 2, struct mtget)
nix::ioctl_read!(mtiocget, b'm', 2, Mtget);

pub const MT_ST_BLKSIZE_MASK: libc::c_long = 0x0ffffff;

bitflags::bitflags! {
    /// Generic (device independent) status bits, from `mt_gstat`.
    pub struct GMTStatusFlags: libc::c_long {
        const EOF = 0x80000000u32 as libc::c_long;
        const BOT = 0x40000000;
        const EOT = 0x20000000;
        const EOD = 0x08000000;
        const WR_PROT = 0x04000000;
        const ONLINE = 0x01000000;
        const DRIVE_OPEN = 0x00040000;
    }
}
