//! Transport framing shared by every datagram.
//!
//! ```text
//! magic u32 | kind u8 | delivery u8 | channel u8 | sequence u32 | ack u32 |
//! ack_bitfield u32 | body
//! ```
//!
//! Reliable data bodies start with a `message_id u32`.

use crate::protocol::{
    Channel, DeliveryMethod, PROTOCOL_MAGIC, PacketError, PacketReader, PacketWriter,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DatagramKind {
    Data = 0,
    ConnectRequest = 1,
    ConnectAccept = 2,
    ConnectDeny = 3,
    Disconnect = 4,
    KeepAlive = 5,
}

impl DatagramKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Data),
            1 => Some(Self::ConnectRequest),
            2 => Some(Self::ConnectAccept),
            3 => Some(Self::ConnectDeny),
            4 => Some(Self::Disconnect),
            5 => Some(Self::KeepAlive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatagramHeader {
    pub kind: DatagramKind,
    pub delivery: DeliveryMethod,
    pub channel: Channel,
    pub sequence: u32,
    pub ack: u32,
    pub ack_bitfield: u32,
}

impl DatagramHeader {
    pub const SIZE: usize = 4 + 3 + 12;

    pub fn write(&self, writer: &mut PacketWriter) {
        writer.write_u32(PROTOCOL_MAGIC);
        writer.write_u8(self.kind as u8);
        writer.write_u8(self.delivery as u8);
        writer.write_u8(self.channel as u8);
        writer.write_u32(self.sequence);
        writer.write_u32(self.ack);
        writer.write_u32(self.ack_bitfield);
    }

    /// Returns `Ok(None)` for datagrams that are not ours (bad magic or
    /// unknown enum values), which are dropped silently.
    pub fn read(reader: &mut PacketReader<'_>) -> Result<Option<Self>, PacketError> {
        reader.ensure(Self::SIZE)?;
        if reader.read_u32()? != PROTOCOL_MAGIC {
            return Ok(None);
        }

        let kind = DatagramKind::from_u8(reader.read_u8()?);
        let delivery = DeliveryMethod::from_u8(reader.read_u8()?);
        let channel = Channel::from_u8(reader.read_u8()?);
        let sequence = reader.read_u32()?;
        let ack = reader.read_u32()?;
        let ack_bitfield = reader.read_u32()?;

        let (Some(kind), Some(delivery), Some(channel)) = (kind, delivery, channel) else {
            return Ok(None);
        };

        Ok(Some(Self {
            kind,
            delivery,
            channel,
            sequence,
            ack,
            ack_bitfield,
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    ConnectRequest { protocol_version: u32 },
    ConnectAccept,
    ConnectDeny { reason: String },
    Disconnect,
    KeepAlive,
}

impl ControlMessage {
    const MAX_REASON_LEN: usize = u8::MAX as usize;

    pub fn kind(&self) -> DatagramKind {
        match self {
            Self::ConnectRequest { .. } => DatagramKind::ConnectRequest,
            Self::ConnectAccept => DatagramKind::ConnectAccept,
            Self::ConnectDeny { .. } => DatagramKind::ConnectDeny,
            Self::Disconnect => DatagramKind::Disconnect,
            Self::KeepAlive => DatagramKind::KeepAlive,
        }
    }

    pub fn write_body(&self, writer: &mut PacketWriter) {
        match self {
            Self::ConnectRequest { protocol_version } => writer.write_u32(*protocol_version),
            Self::ConnectDeny { reason } => {
                let mut end = reason.len().min(Self::MAX_REASON_LEN);
                while !reason.is_char_boundary(end) {
                    end -= 1;
                }
                writer.write_u8(end as u8);
                writer.write_bytes(&reason.as_bytes()[..end]);
            }
            Self::ConnectAccept | Self::Disconnect | Self::KeepAlive => {}
        }
    }

    /// `None` for [`DatagramKind::Data`].
    pub fn read_body(
        kind: DatagramKind,
        reader: &mut PacketReader<'_>,
    ) -> Result<Option<Self>, PacketError> {
        let message = match kind {
            DatagramKind::Data => return Ok(None),
            DatagramKind::ConnectRequest => Self::ConnectRequest {
                protocol_version: reader.read_u32()?,
            },
            DatagramKind::ConnectAccept => Self::ConnectAccept,
            DatagramKind::ConnectDeny => {
                let len = reader.read_u8()? as usize;
                let reason = String::from_utf8_lossy(reader.read_bytes(len)?).into_owned();
                Self::ConnectDeny { reason }
            }
            DatagramKind::Disconnect => Self::Disconnect,
            DatagramKind::KeepAlive => Self::KeepAlive,
        };
        Ok(Some(message))
    }
}
