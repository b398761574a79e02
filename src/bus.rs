//! The control bus: an abstract command/event interface, plus a
//! concrete binding over a fixed-size byte frame (spec §1 "Control bus
//! abstraction" and §8 "Wire format" — the bus protocol itself is out
//! of scope, but *some* concrete binding is needed to exercise the
//! abstraction end to end).
//!
//! `CommandInterface` plays the role the teacher's `RailroadConnector`
//! trait does (`control/connectors/mod.rs`): an `async_trait` seam
//! between the layout runtime and whatever physical bus is attached.
//! `FramedBusAdapter` is the one concrete binding this crate ships,
//! the way `LocoDriveConnector` was the teacher's — except framed over
//! a generic `AsyncRead + AsyncWrite` transport instead of a specific
//! vendor protocol, so the `serial` feature only has to supply the
//! transport (`tokio_serial::SerialStream`), not a whole codec.

use async_trait::async_trait;
use bytes::{Buf, BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::general::{AddressType, DefaultAddressType, Kph};
use crate::ids::TurnoutId;
use crate::model::{BodyDirection, TurnoutState};

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Command<LocoAddr: AddressType = DefaultAddressType, SwitchAddr: AddressType = DefaultAddressType> {
    GlobalGo,
    GlobalStop,
    SetTurnout { turnout: TurnoutId, address: SwitchAddr, state: TurnoutState },
    SetLocoSpeed { address: LocoAddr, speed: Kph },
    SetLocoDirection { address: LocoAddr, direction: BodyDirection },
    SetLocoFunction { address: LocoAddr, function: u8, on: bool },
    QueryLocomotives,
    QueryDirection { address: LocoAddr },
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum BusEvent<LocoAddr: AddressType = DefaultAddressType> {
    FeedbackChanged { contact: u8, occupied: bool },
    LocoDirectionReported { address: LocoAddr, direction: BodyDirection },
    Acknowledged,
    Rejected,
}

/// A bidirectional connection to a control bus: send [`Command`]s,
/// receive [`BusEvent`]s, manage the physical connection lifecycle.
#[async_trait]
pub trait CommandInterface<LocoAddr: AddressType = DefaultAddressType, SwitchAddr: AddressType = DefaultAddressType>:
    Send
{
    async fn execute(&mut self, command: Command<LocoAddr, SwitchAddr>) -> std::io::Result<()>;

    /// Waits for and returns the next event from the bus.
    async fn next_event(&mut self) -> std::io::Result<Option<BusEvent<LocoAddr>>>;

    async fn connect(&mut self) -> std::io::Result<()>;

    async fn disconnect(&mut self) -> std::io::Result<()>;
}

/// The concrete 13-byte-frame binding: `[opcode, 11 bytes of
/// opcode-specific payload, checksum]`. Frame size is configurable
/// (`RuntimeConfig::bus_frame_size`) since real buses in this family
/// commonly agree on a frame width out of band; 13 is this crate's
/// default.
pub struct FramedBusAdapter<T> {
    transport: T,
    frame_size: usize,
    read_buf: BytesMut,
}

mod opcode {
    pub const GLOBAL_GO: u8 = 0x01;
    pub const GLOBAL_STOP: u8 = 0x02;
    pub const SET_TURNOUT: u8 = 0x10;
    pub const SET_LOCO_SPEED: u8 = 0x20;
    pub const SET_LOCO_DIRECTION: u8 = 0x21;
    pub const SET_LOCO_FUNCTION: u8 = 0x22;
    pub const QUERY_LOCOMOTIVES: u8 = 0x30;
    pub const QUERY_DIRECTION: u8 = 0x31;
    pub const FEEDBACK_CHANGED: u8 = 0x40;
    pub const LOCO_DIRECTION_REPORTED: u8 = 0x41;
    pub const ACK: u8 = 0x7e;
    pub const NAK: u8 = 0x7f;
}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> FramedBusAdapter<T> {
    pub fn new(transport: T, frame_size: usize) -> Self {
        FramedBusAdapter {
            transport,
            frame_size,
            read_buf: BytesMut::with_capacity(frame_size * 4),
        }
    }

    fn checksum(frame: &[u8]) -> u8 {
        frame.iter().fold(0u8, |acc, b| acc ^ b)
    }

    fn encode(&self, command: &Command) -> BytesMut {
        let mut frame = BytesMut::with_capacity(self.frame_size);
        match command {
            Command::GlobalGo => frame.put_u8(opcode::GLOBAL_GO),
            Command::GlobalStop => frame.put_u8(opcode::GLOBAL_STOP),
            Command::SetTurnout { address, state, .. } => {
                frame.put_u8(opcode::SET_TURNOUT);
                frame.put_u16(*address);
                frame.put_u8(turnout_state_byte(*state));
            }
            Command::SetLocoSpeed { address, speed } => {
                frame.put_u8(opcode::SET_LOCO_SPEED);
                frame.put_u16(*address);
                frame.put_u16(speed.0);
            }
            Command::SetLocoDirection { address, direction } => {
                frame.put_u8(opcode::SET_LOCO_DIRECTION);
                frame.put_u16(*address);
                frame.put_u8(if *direction == BodyDirection::Forward { 0 } else { 1 });
            }
            Command::SetLocoFunction { address, function, on } => {
                frame.put_u8(opcode::SET_LOCO_FUNCTION);
                frame.put_u16(*address);
                frame.put_u8(*function);
                frame.put_u8(u8::from(*on));
            }
            Command::QueryLocomotives => frame.put_u8(opcode::QUERY_LOCOMOTIVES),
            Command::QueryDirection { address } => {
                frame.put_u8(opcode::QUERY_DIRECTION);
                frame.put_u16(*address);
            }
        }
        while frame.len() < self.frame_size - 1 {
            frame.put_u8(0);
        }
        let checksum = Self::checksum(&frame);
        frame.put_u8(checksum);
        frame
    }
}

fn turnout_state_byte(state: TurnoutState) -> u8 {
    match state {
        TurnoutState::Straight => 0,
        TurnoutState::Branch => 1,
        TurnoutState::Left => 2,
        TurnoutState::Right => 3,
        TurnoutState::Cross => 4,
    }
}

#[async_trait]
impl<T: AsyncRead + AsyncWrite + Unpin + Send> CommandInterface<DefaultAddressType, DefaultAddressType>
    for FramedBusAdapter<T>
{
    async fn execute(&mut self, command: Command) -> std::io::Result<()> {
        let frame = self.encode(&command);
        self.transport.write_all(&frame).await
    }

    async fn next_event(&mut self) -> std::io::Result<Option<BusEvent>> {
        while self.read_buf.len() < self.frame_size {
            let mut chunk = vec![0u8; self.frame_size];
            let read = self.transport.read(&mut chunk).await?;
            if read == 0 {
                return Ok(None);
            }
            self.read_buf.extend_from_slice(&chunk[..read]);
        }

        let mut frame = self.read_buf.split_to(self.frame_size);
        let opcode = frame.get_u8();
        let event = match opcode {
            opcode::FEEDBACK_CHANGED => {
                let contact = frame.get_u8();
                let occupied = frame.get_u8() != 0;
                Some(BusEvent::FeedbackChanged { contact, occupied })
            }
            opcode::LOCO_DIRECTION_REPORTED => {
                let address = frame.get_u16();
                let direction = if frame.get_u8() == 0 {
                    BodyDirection::Forward
                } else {
                    BodyDirection::Backward
                };
                Some(BusEvent::LocoDirectionReported { address, direction })
            }
            opcode::ACK => Some(BusEvent::Acknowledged),
            opcode::NAK => Some(BusEvent::Rejected),
            _ => None,
        };
        Ok(event)
    }

    async fn connect(&mut self) -> std::io::Result<()> {
        Ok(())
    }

    async fn disconnect(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
