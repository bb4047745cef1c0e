//! Fuzz target: smart-door wire parsing
//!
//! Arbitrary device text either maps to a catalogue label with the
//! declared parameter count or is rejected. Never panics.
//!
//! cargo fuzz run fuzz_door_wire

#![no_main]

use libfuzzer_sys::fuzz_target;
use testbridge::adapters::smartdoor::catalogue;
use testbridge::adapters::smartdoor::converter::wire_to_label;
use testbridge::protocol::LabelType;

fuzz_target!(|text: &str| {
    let catalogue = catalogue();
    for label_type in [LabelType::Stimulus, LabelType::Response] {
        if let Ok(label) = wire_to_label(text, &catalogue, label_type) {
            let template = catalogue
                .iter()
                .find(|l| l.name == label.name && l.label_type == label_type)
                .expect("parsed label comes from the catalogue");
            assert_eq!(label.parameters.len(), template.parameters.len());
        }
    }
});
