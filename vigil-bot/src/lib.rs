//! Delivery side of Vigil: turns a batch of discovered posts into one chat digest
//! and pushes it to OneBot destinations. See [`onebot::OneBotDispatcher`].
pub mod onebot;
