//! Invite Module - Install-Link per SMS
//!

mod sms;

pub use sms::{
    divide_message, InviteError, InviteSender, SmsEncoding, SmsTransport, GSM7_MULTIPART_LEN,
    GSM7_SINGLE_LEN, UCS2_MULTIPART_LEN, UCS2_SINGLE_LEN,
};
