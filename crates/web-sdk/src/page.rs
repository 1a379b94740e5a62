//! The host handles one tracker instance runs against.

use std::rc::Rc;

use trackkit_core::WallClock;

use crate::dom::Dom;
use crate::environment::Environment;
use crate::history::HistorySurface;
use crate::identity::KeyValueStore;
use crate::signal::GlobalTarget;

pub struct Page<E> {
    pub dom: Rc<dyn Dom<Element = E>>,
    pub target: Rc<dyn GlobalTarget<E>>,
    pub history: Rc<dyn HistorySurface>,
    pub environment: Rc<dyn Environment>,
    pub storage: Option<Rc<dyn KeyValueStore>>,
    pub clock: Rc<dyn WallClock>,
}

impl<E> Clone for Page<E> {
    fn clone(&self) -> Self {
        Self {
            dom: Rc::clone(&self.dom),
            target: Rc::clone(&self.target),
            history: Rc::clone(&self.history),
            environment: Rc::clone(&self.environment),
            storage: self.storage.clone(),
            clock: Rc::clone(&self.clock),
        }
    }
}
