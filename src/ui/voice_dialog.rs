use std::cell::RefCell;
use std::rc::Rc;

use adw::prelude::*;
use gtk4 as gtk;
use log::{info, warn};
use tokio::sync::mpsc;

use crate::state::voice::{INTRO, RoomOutcome, VoiceOverlay, VoicePhase};
use crate::ui::Shell;
use crate::voice::{VoiceEvent, VoiceLink};

/// Voice overlay. `on_ended` runs after a call that was actually started.
pub fn show_voice_dialog<F: Fn() + 'static>(shell: &Rc<Shell>, on_ended: F) {
    let dialog = VoiceDialog::new(shell.clone(), Rc::new(on_ended));
    dialog.window.present();
}

struct VoiceDialog {
    window: adw::Window,
    stack: gtk::Stack,
    start_btn: gtk::Button,
    room: gtk::Label,
    error: gtk::Label,
    overlay: RefCell<VoiceOverlay>,
    link: RefCell<Option<VoiceLink>>,
    shell: Rc<Shell>,
    on_ended: Rc<dyn Fn()>,
}

fn page() -> gtk::Box {
    let b = gtk::Box::new(gtk::Orientation::Vertical, 12);
    b.set_margin_top(24);
    b.set_margin_bottom(24);
    b.set_margin_start(24);
    b.set_margin_end(24);
    b.set_valign(gtk::Align::Center);
    b
}

impl VoiceDialog {
    fn new(shell: Rc<Shell>, on_ended: Rc<dyn Fn()>) -> Rc<Self> {
        let window = adw::Window::builder()
            .title("Voice Chat")
            .transient_for(&shell.window)
            .modal(true)
            .default_width(380)
            .default_height(320)
            .build();

        let stack = gtk::Stack::new();

        let idle = page();
        let intro = gtk::Label::new(Some(INTRO));
        intro.set_wrap(true);
        intro.set_justify(gtk::Justification::Center);
        let start_btn = gtk::Button::with_label("Start Voice Chat");
        start_btn.add_css_class("suggested-action");
        start_btn.add_css_class("pill");
        start_btn.set_halign(gtk::Align::Center);
        idle.append(&intro);
        idle.append(&start_btn);
        stack.add_named(&idle, Some("idle"));

        let connected = page();
        let icon = gtk::Image::from_icon_name("audio-input-microphone-symbolic");
        icon.set_pixel_size(64);
        let room = gtk::Label::new(None);
        room.add_css_class("dim-label");
        let end_btn = gtk::Button::with_label("End Call");
        end_btn.add_css_class("destructive-action");
        end_btn.add_css_class("pill");
        end_btn.set_halign(gtk::Align::Center);
        connected.append(&icon);
        connected.append(&gtk::Label::new(Some("You are talking to Virtual-G")));
        connected.append(&room);
        connected.append(&end_btn);
        stack.add_named(&connected, Some("connected"));

        let failed = page();
        let error = gtk::Label::new(None);
        error.add_css_class("error");
        error.set_wrap(true);
        error.set_justify(gtk::Justification::Center);
        let retry_btn = gtk::Button::with_label("Try again");
        retry_btn.add_css_class("pill");
        retry_btn.set_halign(gtk::Align::Center);
        failed.append(&error);
        failed.append(&retry_btn);
        stack.add_named(&failed, Some("error"));

        let content = gtk::Box::new(gtk::Orientation::Vertical, 0);
        content.append(&adw::HeaderBar::new());
        content.append(&stack);
        window.set_content(Some(&content));

        let dialog = Rc::new(Self {
            window,
            stack,
            start_btn,
            room,
            error,
            overlay: RefCell::new(VoiceOverlay::new()),
            link: RefCell::new(None),
            shell,
            on_ended,
        });

        {
            let this = dialog.clone();
            dialog.start_btn.connect_clicked(move |_| this.start());
        }
        {
            let this = dialog.clone();
            end_btn.connect_clicked(move |_| this.window.close());
        }
        {
            let this = dialog.clone();
            retry_btn.connect_clicked(move |_| {
                this.overlay.borrow_mut().retry();
                this.render();
            });
        }
        {
            // closing the overlay always tears the call down
            let this = dialog.clone();
            dialog.window.connect_close_request(move |_| {
                this.hang_up();
                glib::Propagation::Proceed
            });
        }

        dialog.render();
        dialog
    }

    fn start(self: &Rc<Self>) {
        let room_name = self.overlay.borrow_mut().start();
        let Some(room_name) = room_name else {
            return;
        };
        self.render();

        let client = self.shell.client.clone();
        let this = self.clone();
        crate::utils::run_async_to_main(
            async move {
                let res = client.create_voice_room(&room_name).await;
                (room_name, res)
            },
            move |(room_name, res)| {
                let res = this.overlay.borrow_mut().room_created(&room_name, res);
                this.render();
                match res {
                    Ok(RoomOutcome::Join) => this.join(),
                    Ok(RoomOutcome::Abandon(room)) => {
                        info!("voice overlay closed before room {room} was ready");
                        this.end_remote(Some(room));
                        (this.on_ended)();
                    }
                    Err(e) if e.is_auth_failure() => {
                        this.window.close();
                        this.shell.sign_out();
                    }
                    Err(e) => warn!("voice room not created: {e}"),
                }
            },
        );
    }

    /// Opens the signalling link for the room just created.
    fn join(self: &Rc<Self>) {
        let room = match self.overlay.borrow().phase() {
            VoicePhase::Connected(room) => room.clone(),
            _ => return,
        };
        let (tx, mut rx) = mpsc::unbounded_channel();

        let this = self.clone();
        crate::utils::run_async_to_main(async move { VoiceLink::connect(&room, tx).await }, move |res| match res {
            Ok(mut link) => {
                // the overlay may have been closed while connecting
                if matches!(this.overlay.borrow().phase(), VoicePhase::Connected(_)) {
                    this.link.replace(Some(link));
                } else {
                    link.close();
                }
            }
            Err(e) => {
                warn!("voice link failed: {e}");
                let room = this.overlay.borrow_mut().link_failed(e.to_string());
                this.end_remote(room);
                this.render();
            }
        });

        let this = self.clone();
        glib::MainContext::default().spawn_local(async move {
            while let Some(event) = rx.recv().await {
                match event {
                    VoiceEvent::Connected => info!("voice call connected"),
                    VoiceEvent::Disconnected(None) => break,
                    VoiceEvent::Disconnected(Some(reason)) => {
                        warn!("voice call dropped: {reason}");
                        this.shell.toast("Voice call ended");
                        this.window.close();
                        break;
                    }
                }
            }
        });
    }

    /// Ends the call, if any. Safe to call more than once.
    fn hang_up(&self) {
        if let Some(mut link) = self.link.borrow_mut().take() {
            link.close();
        }
        let room = self.overlay.borrow_mut().end();
        if room.is_some() {
            self.end_remote(room);
            (self.on_ended)();
        }
    }

    /// Ends the room server-side; failures only get logged.
    fn end_remote(&self, room: Option<String>) {
        let Some(room_name) = room else {
            return;
        };
        let client = self.shell.client.clone();
        crate::utils::spawn_async(async move {
            match client.end_voice_session(&room_name).await {
                Ok(()) => info!("ended voice session {room_name}"),
                Err(e) => warn!("failed to end voice session {room_name}: {e}"),
            }
        });
    }

    fn render(&self) {
        let overlay = self.overlay.borrow();
        self.start_btn.set_label(overlay.start_label());
        let name = match overlay.phase() {
            VoicePhase::Idle => {
                self.start_btn.set_sensitive(true);
                "idle"
            }
            VoicePhase::Connecting { .. } => {
                self.start_btn.set_sensitive(false);
                "idle"
            }
            VoicePhase::Connected(room) => {
                self.room.set_label(&room.room_name);
                "connected"
            }
            VoicePhase::Error(msg) => {
                self.error.set_label(msg);
                "error"
            }
        };
        self.stack.set_visible_child_name(name);
    }
}
