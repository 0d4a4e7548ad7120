use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;

use gtk4 as gtk;
use gtk4::prelude::*;
use gtk4::{gdk, glib};
use log::{debug, warn};

use crate::api::models::{CreditShortfall, Message, MessageKind, Role};
use crate::markup::{escape, markdown_to_pango};
use crate::state::chat::{self, ChatCall, ChatState, SendOutcome, TYPING_LABEL};
use crate::ui::Shell;

pub struct ChatView {
    root: gtk::Box,
    scroller: gtk::ScrolledWindow,
    transcript: gtk::Box,
    typing: gtk::Box,
    entry: gtk::Entry,
    attachment: gtk::Label,
    state: RefCell<ChatState>,
    pending_image: RefCell<Option<PathBuf>>,
    file_dialog: RefCell<Option<gtk::FileChooserNative>>,
    images: RefCell<HashMap<String, gdk::Texture>>,
    shell: Rc<Shell>,
    on_replied: RefCell<Option<Rc<dyn Fn()>>>,
    on_purchase_required: RefCell<Option<Rc<dyn Fn(CreditShortfall)>>>,
}

impl ChatView {
    pub fn new(shell: Rc<Shell>) -> Rc<Self> {
        let root = gtk::Box::new(gtk::Orientation::Vertical, 6);
        root.set_margin_top(8);
        root.set_margin_bottom(8);
        root.set_margin_start(8);
        root.set_margin_end(8);

        let transcript = gtk::Box::new(gtk::Orientation::Vertical, 10);
        transcript.set_margin_start(6);
        transcript.set_margin_end(6);
        let scroller = gtk::ScrolledWindow::builder()
            .vexpand(true)
            .hexpand(true)
            .hscrollbar_policy(gtk::PolicyType::Never)
            .child(&transcript)
            .build();
        root.append(&scroller);

        let typing = gtk::Box::new(gtk::Orientation::Horizontal, 6);
        let spinner = gtk::Spinner::new();
        spinner.start();
        let typing_label = gtk::Label::new(Some(TYPING_LABEL));
        typing_label.add_css_class("dim-label");
        typing.append(&spinner);
        typing.append(&typing_label);
        typing.set_visible(false);
        root.append(&typing);

        let attachment = gtk::Label::new(None);
        attachment.add_css_class("caption");
        attachment.add_css_class("dim-label");
        attachment.set_halign(gtk::Align::Start);
        attachment.set_visible(false);
        root.append(&attachment);

        let input_row = gtk::Box::new(gtk::Orientation::Horizontal, 6);
        let attach_btn = gtk::Button::from_icon_name("image-x-generic-symbolic");
        attach_btn.set_tooltip_text(Some("Attach an image"));
        let entry = gtk::Entry::new();
        entry.set_hexpand(true);
        entry.set_placeholder_text(Some("Type something sweet..."));
        let send_btn = gtk::Button::with_label("Send");
        send_btn.add_css_class("suggested-action");
        input_row.append(&attach_btn);
        input_row.append(&entry);
        input_row.append(&send_btn);
        root.append(&input_row);

        let view = Rc::new(Self {
            root,
            scroller,
            transcript,
            typing,
            entry,
            attachment,
            state: RefCell::new(ChatState::new(None)),
            pending_image: RefCell::new(None),
            file_dialog: RefCell::new(None),
            images: RefCell::new(HashMap::new()),
            shell,
            on_replied: RefCell::new(None),
            on_purchase_required: RefCell::new(None),
        });

        {
            let this = view.clone();
            send_btn.connect_clicked(move |_| this.send());
        }
        {
            let this = view.clone();
            view.entry.connect_activate(move |_| this.send());
        }
        {
            let this = view.clone();
            attach_btn.connect_clicked(move |_| this.choose_image());
        }

        view
    }

    pub fn widget(&self) -> gtk::Widget {
        self.root.clone().upcast()
    }

    /// A reply arrived; balances and session previews are stale.
    pub fn connect_replied<F: Fn() + 'static>(&self, f: F) {
        self.on_replied.replace(Some(Rc::new(f)));
    }

    pub fn connect_purchase_required<F: Fn(CreditShortfall) + 'static>(&self, f: F) {
        self.on_purchase_required.replace(Some(Rc::new(f)));
    }

    /// Shows `session_id` (or the default session) and loads its history.
    pub fn show_session(self: &Rc<Self>, session_id: Option<String>) {
        self.state.borrow_mut().switch_to(session_id.clone());
        self.render();

        let client = self.shell.client.clone();
        let this = self.clone();
        let for_session = session_id.clone();
        crate::utils::run_async_to_main(
            async move { chat::fetch_history(&client, session_id.as_deref()).await },
            move |res| {
                let res = this.state.borrow_mut().apply_history(for_session.as_deref(), res);
                if let Err(e) = res {
                    this.shell.report("Failed to load chat", &e);
                }
                this.render();
            },
        );
    }

    fn send(self: &Rc<Self>) {
        let text = Some(self.entry.text().to_string()).filter(|t| !t.trim().is_empty());
        let image = self.pending_image.borrow_mut().take();
        self.attachment.set_visible(false);

        let Some(path) = image else {
            let call = self.state.borrow_mut().begin_send(text, None);
            if let Some(call) = call {
                self.entry.set_text("");
                self.dispatch(call);
            }
            return;
        };

        // the image goes up first; its URL is what the transcript shows
        self.entry.set_text("");
        let ticket = self.state.borrow().ticket();
        let client = self.shell.client.clone();
        let this = self.clone();
        crate::utils::run_async_to_main(
            async move {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "image".to_string());
                let bytes = tokio::fs::read(&path).await?;
                client.upload(&name, bytes).await
            },
            move |res| match res {
                Ok(url) => {
                    let call = this.state.borrow_mut().send_uploaded(ticket, text, url);
                    if let Some(call) = call {
                        this.dispatch(call);
                    }
                }
                Err(e) => {
                    let outcome = this.state.borrow_mut().fail_upload(ticket, e);
                    this.render();
                    this.handle(outcome);
                }
            },
        );
    }

    fn dispatch(self: &Rc<Self>, call: ChatCall) {
        self.render();
        let client = self.shell.client.clone();
        let this = self.clone();
        crate::utils::run_async_to_main(
            async move {
                let res = call.run(&client).await;
                (call.ticket(), res)
            },
            move |(ticket, res)| {
                let outcome = this.state.borrow_mut().finish_send(ticket, res);
                this.render();
                this.handle(outcome);
            },
        );
    }

    fn handle(&self, outcome: SendOutcome) {
        match outcome {
            SendOutcome::Replied { .. } => {
                let cb = self.on_replied.borrow().clone();
                if let Some(cb) = cb {
                    cb();
                }
            }
            SendOutcome::PurchaseRequired(shortfall) => {
                let cb = self.on_purchase_required.borrow().clone();
                if let Some(cb) = cb {
                    cb(shortfall);
                }
            }
            SendOutcome::SignInRequired => self.shell.sign_out(),
            SendOutcome::Failed(msg) => debug!("chat send failed: {msg}"),
            SendOutcome::Discarded => debug!("dropped reply for a previous session"),
        }
    }

    #[allow(deprecated)]
    fn choose_image(self: &Rc<Self>) {
        let dialog = gtk::FileChooserNative::new(
            Some("Choose an image"),
            Some(&self.shell.window),
            gtk::FileChooserAction::Open,
            Some("Attach"),
            Some("Cancel"),
        );
        let filter = gtk::FileFilter::new();
        filter.set_name(Some("Images"));
        filter.add_mime_type("image/*");
        dialog.add_filter(&filter);

        let this = self.clone();
        dialog.connect_response(move |d, resp| {
            if resp == gtk::ResponseType::Accept {
                if let Some(path) = d.file().and_then(|f| f.path()) {
                    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
                    this.attachment.set_label(&format!("Attached: {name}"));
                    this.attachment.set_visible(true);
                    this.pending_image.replace(Some(path));
                }
            }
            this.file_dialog.replace(None);
        });
        dialog.show();
        self.file_dialog.replace(Some(dialog));
    }

    fn render(self: &Rc<Self>) {
        while let Some(child) = self.transcript.first_child() {
            self.transcript.remove(&child);
        }
        let state = self.state.borrow();
        for message in state.messages() {
            let bubble = self.bubble(message);
            self.transcript.append(&bubble);
        }
        self.typing.set_visible(state.is_awaiting_reply());
        drop(state);

        // after layout, so `upper` covers the new rows
        let scroller = self.scroller.clone();
        glib::idle_add_local_once(move || {
            let adj = scroller.vadjustment();
            adj.set_value(adj.upper());
        });
    }

    fn bubble(self: &Rc<Self>, message: &Message) -> gtk::Box {
        let bubble = gtk::Box::new(gtk::Orientation::Vertical, 4);
        bubble.add_css_class("card");
        let inner_margin = 10;
        let body: gtk::Widget = match message.kind {
            MessageKind::Image => self.image(&message.content).upcast(),
            MessageKind::Text => {
                let label = gtk::Label::new(None);
                match message.role {
                    Role::Ai => label.set_markup(&markdown_to_pango(&message.content)),
                    Role::User => label.set_markup(&escape(&message.content)),
                }
                label.set_wrap(true);
                label.set_wrap_mode(gtk::pango::WrapMode::WordChar);
                label.set_max_width_chars(60);
                label.set_xalign(0.0);
                label.set_selectable(true);
                label.upcast()
            }
        };
        body.set_margin_top(inner_margin);
        body.set_margin_start(inner_margin);
        body.set_margin_end(inner_margin);
        bubble.append(&body);

        let time = gtk::Label::new(Some(&message.time_label()));
        time.add_css_class("caption");
        time.add_css_class("dim-label");
        time.set_halign(gtk::Align::End);
        time.set_margin_bottom(6);
        time.set_margin_end(inner_margin);
        bubble.append(&time);

        match message.role {
            Role::User => {
                bubble.set_halign(gtk::Align::End);
                bubble.set_margin_start(48);
            }
            Role::Ai => {
                bubble.set_halign(gtk::Align::Start);
                bubble.set_margin_end(48);
            }
        }
        bubble
    }

    fn image(self: &Rc<Self>, url: &str) -> gtk::Picture {
        let picture = gtk::Picture::new();
        picture.set_size_request(240, 180);
        picture.set_can_shrink(true);
        if let Some(texture) = self.images.borrow().get(url) {
            picture.set_paintable(Some(texture));
            return picture;
        }

        let client = self.shell.client.clone();
        let this = self.clone();
        let target = picture.clone();
        let url = url.to_string();
        let fetch_url = url.clone();
        crate::utils::run_async_to_main(async move { client.fetch_bytes(&fetch_url).await }, move |res| {
            let bytes = match res {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("failed to load image {url}: {e}");
                    return;
                }
            };
            match gdk::Texture::from_bytes(&glib::Bytes::from_owned(bytes)) {
                Ok(texture) => {
                    target.set_paintable(Some(&texture));
                    this.images.borrow_mut().insert(url, texture);
                }
                Err(e) => warn!("cannot decode image {url}: {e}"),
            }
        });
        picture
    }
}
