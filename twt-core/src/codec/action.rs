//! S1G action frames carrying TWT setup, teardown and information.
//!
//! ```text
//! setup:       category:u8 action:u8 dialog_token:u8 TwtElement
//! teardown:    category:u8 action:u8 teardown:u8
//! information: category:u8 action:u8 info:u8 [next_twt]
//! ```
//!
//! Only the frame body is handled here; transmission belongs to the
//! management-frame layer.

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::element::TwtElement;
use crate::codec::ensure_len;
use crate::codec::fields::{TeardownField, TwtInformation};
use crate::error::CodecError;

/// Category code of S1G action frames.
pub const WLAN_CATEGORY_S1G: u8 = 22;

pub const S1G_ACTION_TWT_SETUP: u8 = 6;
pub const S1G_ACTION_TWT_TEARDOWN: u8 = 7;
pub const S1G_ACTION_TWT_INFORMATION: u8 = 11;

const CATEGORY_OFFSET: usize = 0;
const ACTION_OFFSET: usize = 1;
const SETUP_DIALOG_TOKEN_OFFSET: usize = 2;
const SETUP_ELEMENT_OFFSET: usize = 3;
const TEARDOWN_FIELD_OFFSET: usize = 2;
const INFORMATION_FIELD_OFFSET: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TwtActionFrame {
    Setup {
        dialog_token: u8,
        element: TwtElement,
    },
    Teardown(TeardownField),
    Information(TwtInformation),
}

impl TwtActionFrame {
    pub fn action_code(&self) -> u8 {
        match self {
            Self::Setup { .. } => S1G_ACTION_TWT_SETUP,
            Self::Teardown(_) => S1G_ACTION_TWT_TEARDOWN,
            Self::Information(_) => S1G_ACTION_TWT_INFORMATION,
        }
    }

    pub fn encode(&self) -> Result<Bytes, CodecError> {
        let mut buf = BytesMut::with_capacity(32);
        buf.put_u8(WLAN_CATEGORY_S1G);
        buf.put_u8(self.action_code());
        match self {
            Self::Setup {
                dialog_token,
                element,
            } => {
                buf.put_u8(*dialog_token);
                buf.extend_from_slice(&element.encode()?);
            }
            Self::Teardown(field) => buf.put_u8(field.encode()?),
            Self::Information(info) => info.encode(&mut buf)?,
        }
        Ok(buf.freeze())
    }

    /// Decodes an action frame body. Elements following the TWT element
    /// of a setup frame are left to the caller.
    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        ensure_len(buf, ACTION_OFFSET + 1)?;
        let category = buf[CATEGORY_OFFSET];
        let action = buf[ACTION_OFFSET];
        if category != WLAN_CATEGORY_S1G {
            return Err(CodecError::UnexpectedAction { category, action });
        }

        match action {
            S1G_ACTION_TWT_SETUP => {
                ensure_len(buf, SETUP_ELEMENT_OFFSET + 1)?;
                let (element, _) = TwtElement::decode(&buf[SETUP_ELEMENT_OFFSET..])?;
                Ok(Self::Setup {
                    dialog_token: buf[SETUP_DIALOG_TOKEN_OFFSET],
                    element,
                })
            }
            S1G_ACTION_TWT_TEARDOWN => {
                ensure_len(buf, TEARDOWN_FIELD_OFFSET + 1)?;
                Ok(Self::Teardown(TeardownField::decode(
                    buf[TEARDOWN_FIELD_OFFSET],
                )?))
            }
            S1G_ACTION_TWT_INFORMATION => {
                let (info, _) = TwtInformation::decode(&buf[INFORMATION_FIELD_OFFSET..])?;
                Ok(Self::Information(info))
            }
            _ => Err(CodecError::UnexpectedAction { category, action }),
        }
    }
}
