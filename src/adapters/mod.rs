//! Adapters: concrete implementations of the port traits.
//!
//! | Adapter     | Implements | Connects to                     |
//! |-------------|------------|---------------------------------|
//! | `log_sink`  | EventSink  | `log` facade                    |
//! | `smartdoor` | Handler    | smart-door SUT over a WebSocket |

pub mod log_sink;
pub mod smartdoor;
