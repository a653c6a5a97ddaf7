// Coordinator/worker message protocol
//
// Four logical channels (control, common, input, output) carry typed
// messages. Stream transports frame them as length-prefixed CBOR, and
// slices larger than a frame travel as several parts.

pub mod frame;
mod messages;
pub mod parts;

pub use frame::{read_frame, write_frame, DEFAULT_MAX_FRAME_BYTES};
pub use messages::{Channel, Message, Opcode};
pub use parts::{part_ranges, samples_per_part, SliceAssembly};
