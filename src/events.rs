//! Event delivery to the host application.
//!
//! Each event kind keeps its own bounded subscriber list; subscribers are
//! added at configuration time and invoked synchronously in registration
//! order from within `poll()`.

use heapless::Vec;

use crate::error::Error;

pub const MAX_SUBSCRIBERS: usize = 4;

type TextPairFn<'a> = &'a mut (dyn FnMut(&str, &str) + 'a);
type TextFn<'a> = &'a mut (dyn FnMut(&str) + 'a);
type UnitFn<'a> = &'a mut (dyn FnMut() + 'a);

#[derive(Default)]
pub(crate) struct Callbacks<'a> {
    sms_received: Vec<TextPairFn<'a>, MAX_SUBSCRIBERS>,
    sms_sent: Vec<TextPairFn<'a>, MAX_SUBSCRIBERS>,
    sms_send_failed: Vec<TextPairFn<'a>, MAX_SUBSCRIBERS>,
    incoming_call: Vec<TextFn<'a>, MAX_SUBSCRIBERS>,
    call_connected: Vec<UnitFn<'a>, MAX_SUBSCRIBERS>,
    call_disconnected: Vec<UnitFn<'a>, MAX_SUBSCRIBERS>,
    ussd_received: Vec<TextFn<'a>, MAX_SUBSCRIBERS>,
}

macro_rules! register {
    ($list:expr, $cb:expr) => {
        $list.push($cb).map_err(|_| Error::Overflow)
    };
}

impl<'a> Callbacks<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sms_received(&mut self, cb: TextPairFn<'a>) -> Result<(), Error> {
        register!(self.sms_received, cb)
    }

    pub fn add_sms_sent(&mut self, cb: TextPairFn<'a>) -> Result<(), Error> {
        register!(self.sms_sent, cb)
    }

    pub fn add_sms_send_failed(&mut self, cb: TextPairFn<'a>) -> Result<(), Error> {
        register!(self.sms_send_failed, cb)
    }

    pub fn add_incoming_call(&mut self, cb: TextFn<'a>) -> Result<(), Error> {
        register!(self.incoming_call, cb)
    }

    pub fn add_call_connected(&mut self, cb: UnitFn<'a>) -> Result<(), Error> {
        register!(self.call_connected, cb)
    }

    pub fn add_call_disconnected(&mut self, cb: UnitFn<'a>) -> Result<(), Error> {
        register!(self.call_disconnected, cb)
    }

    pub fn add_ussd_received(&mut self, cb: TextFn<'a>) -> Result<(), Error> {
        register!(self.ussd_received, cb)
    }

    pub fn notify_sms_received(&mut self, text: &str, sender: &str) {
        for cb in self.sms_received.iter_mut() {
            cb(text, sender);
        }
    }

    pub fn notify_sms_sent(&mut self, text: &str, recipient: &str) {
        for cb in self.sms_sent.iter_mut() {
            cb(text, recipient);
        }
    }

    pub fn notify_sms_send_failed(&mut self, reason: &str, recipient: &str) {
        for cb in self.sms_send_failed.iter_mut() {
            cb(reason, recipient);
        }
    }

    pub fn notify_incoming_call(&mut self, caller_id: &str) {
        for cb in self.incoming_call.iter_mut() {
            cb(caller_id);
        }
    }

    pub fn notify_call_connected(&mut self) {
        for cb in self.call_connected.iter_mut() {
            cb();
        }
    }

    pub fn notify_call_disconnected(&mut self) {
        for cb in self.call_disconnected.iter_mut() {
            cb();
        }
    }

    pub fn notify_ussd_received(&mut self, text: &str) {
        for cb in self.ussd_received.iter_mut() {
            cb(text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn subscribers_fire_in_registration_order() {
        let order = RefCell::new(Vec::<u8, 4>::new());
        let mut first = |_: &str, _: &str| {
            order.borrow_mut().push(1).unwrap();
        };
        let mut second = |_: &str, _: &str| {
            order.borrow_mut().push(2).unwrap();
        };

        let mut callbacks = Callbacks::new();
        callbacks.add_sms_received(&mut first).unwrap();
        callbacks.add_sms_received(&mut second).unwrap();
        callbacks.notify_sms_received("hi", "+1");

        assert_eq!(order.borrow().as_slice(), &[1, 2]);
    }

    #[test]
    fn registry_rejects_excess_subscribers() {
        let mut cbs: [_; MAX_SUBSCRIBERS + 1] = core::array::from_fn(|_| |_: &str| {});
        let mut callbacks = Callbacks::new();
        let mut iter = cbs.iter_mut();
        for _ in 0..MAX_SUBSCRIBERS {
            let cb = iter.next().unwrap();
            callbacks.add_ussd_received(cb).unwrap();
        }
        let last = iter.next().unwrap();
        assert_eq!(callbacks.add_ussd_received(last), Err(Error::Overflow));
    }
}
