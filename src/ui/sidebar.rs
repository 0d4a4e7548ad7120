use std::cell::RefCell;
use std::rc::Rc;

use gtk4 as gtk;
use gtk4::prelude::*;
use log::{debug, warn};

use crate::api::models::Session;
use crate::state::sessions::{self, Selection, SessionListState};
use crate::storage::SessionCache;
use crate::ui::Shell;

/// Session list on the side of the chat.
pub struct Sidebar {
    root: gtk::Box,
    list: gtk::ListBox,
    status: gtk::Label,
    footer: gtk::Label,
    state: RefCell<SessionListState>,
    cache: RefCell<Option<SessionCache>>,
    shell: Rc<Shell>,
    on_select: RefCell<Option<Rc<dyn Fn(Selection)>>>,
}

impl Sidebar {
    pub fn new(shell: Rc<Shell>, cache: Option<SessionCache>) -> Rc<Self> {
        let cached = cache
            .as_ref()
            .and_then(|c| c.list(None).map_err(|e| warn!("failed to read session cache: {e}")).ok())
            .unwrap_or_default();

        let root = gtk::Box::new(gtk::Orientation::Vertical, 6);
        root.set_width_request(280);
        root.set_margin_top(8);
        root.set_margin_bottom(8);
        root.set_margin_start(8);
        root.set_margin_end(8);

        let title = gtk::Label::new(Some("Chat Sessions"));
        title.add_css_class("heading");
        title.set_halign(gtk::Align::Start);
        root.append(&title);

        let new_btn = gtk::Button::with_label("New Chat");
        new_btn.add_css_class("suggested-action");
        root.append(&new_btn);

        let status = gtk::Label::new(None);
        status.add_css_class("dim-label");
        status.set_margin_top(12);

        let list = gtk::ListBox::new();
        list.add_css_class("navigation-sidebar");
        let scroller = gtk::ScrolledWindow::builder()
            .vexpand(true)
            .hscrollbar_policy(gtk::PolicyType::Never)
            .child(&list)
            .build();
        root.append(&status);
        root.append(&scroller);

        let footer = gtk::Label::new(None);
        footer.add_css_class("dim-label");
        footer.add_css_class("caption");
        root.append(&footer);

        let sidebar = Rc::new(Self {
            root,
            list,
            status,
            footer,
            state: RefCell::new(SessionListState::new(cached)),
            cache: RefCell::new(cache),
            shell,
            on_select: RefCell::new(None),
        });

        {
            let this = sidebar.clone();
            new_btn.connect_clicked(move |_| this.create());
        }
        {
            let this = sidebar.clone();
            sidebar.list.connect_row_activated(move |_, row| {
                let id = usize::try_from(row.index())
                    .ok()
                    .and_then(|i| this.state.borrow().sessions().get(i).map(|s| s.id.clone()));
                if let Some(id) = id {
                    let sel = this.state.borrow_mut().select(&id);
                    this.emit(sel);
                }
            });
        }

        sidebar.render();
        sidebar
    }

    pub fn widget(&self) -> gtk::Widget {
        self.root.clone().upcast()
    }

    /// Called with every selection change, including "selection cleared".
    pub fn connect_selected<F: Fn(Selection) + 'static>(&self, f: F) {
        self.on_select.replace(Some(Rc::new(f)));
    }

    fn emit(&self, selection: Selection) {
        if selection == Selection::Unchanged {
            return;
        }
        let cb = self.on_select.borrow().clone();
        if let Some(cb) = cb {
            cb(selection);
        }
    }

    pub fn refresh(self: &Rc<Self>) {
        self.state.borrow_mut().begin_refresh();
        self.render();
        let client = self.shell.client.clone();
        let this = self.clone();
        crate::utils::run_async_to_main(async move { client.sessions().await }, move |res| {
            let res = this.state.borrow_mut().apply_refresh(res);
            match res {
                Ok(()) => this.store(),
                Err(e) => this.shell.report("Failed to load sessions", &e),
            }
            this.render();
        });
    }

    fn create(self: &Rc<Self>) {
        let client = self.shell.client.clone();
        let this = self.clone();
        crate::utils::run_async_to_main(
            async move { sessions::create_and_refresh(&client).await },
            move |res| match res {
                Ok((id, list)) => {
                    debug!("created session {id}");
                    let sel = this.state.borrow_mut().apply_created(id, list);
                    this.store();
                    this.render();
                    this.emit(sel);
                }
                Err(e) => this.shell.report("Failed to create new chat", &e),
            },
        );
    }

    fn delete(self: &Rc<Self>, id: String) {
        let client = self.shell.client.clone();
        let this = self.clone();
        crate::utils::run_async_to_main(
            async move {
                let res = sessions::delete_and_refresh(&client, &id).await;
                (id, res)
            },
            move |(id, res)| match res {
                Ok(refreshed) => {
                    let refreshed = match refreshed {
                        Ok(list) => Some(list),
                        Err(e) => {
                            this.shell.report("Failed to refresh sessions", &e);
                            None
                        }
                    };
                    let fetched = refreshed.is_some();
                    let sel = this.state.borrow_mut().apply_deleted(&id, refreshed);
                    if fetched {
                        this.store();
                    } else {
                        this.forget(&id);
                    }
                    this.render();
                    this.emit(sel);
                }
                Err(e) => this.shell.report("Failed to delete session", &e),
            },
        );
    }

    fn forget(&self, id: &str) {
        if let Some(cache) = self.cache.borrow().as_ref() {
            if let Err(e) = cache.remove(id) {
                warn!("failed to update session cache: {e}");
            }
        }
    }

    /// Mirrors the current list into the local cache.
    fn store(&self) {
        if let Some(cache) = self.cache.borrow_mut().as_mut() {
            if let Err(e) = cache.replace_all(self.state.borrow().sessions()) {
                warn!("failed to update session cache: {e}");
            }
        }
    }

    fn render(self: &Rc<Self>) {
        while let Some(child) = self.list.first_child() {
            self.list.remove(&child);
        }

        let state = self.state.borrow();
        if state.is_loading() && state.sessions().is_empty() {
            self.status.set_label("Loading sessions...");
            self.status.set_visible(true);
        } else if state.is_empty() {
            self.status.set_label("No chat sessions yet");
            self.status.set_visible(true);
        } else {
            self.status.set_visible(false);
        }
        self.footer.set_label(&state.footer_label());

        for (idx, session) in state.sessions().iter().enumerate() {
            let row = self.session_row(session);
            self.list.append(&row);
            if state.selected() == Some(session.id.as_str()) {
                self.list.select_row(self.list.row_at_index(idx as i32).as_ref());
            }
        }
    }

    fn session_row(self: &Rc<Self>, session: &Session) -> gtk::ListBoxRow {
        let row = gtk::ListBoxRow::new();
        let hbox = gtk::Box::new(gtk::Orientation::Horizontal, 6);
        hbox.set_margin_top(6);
        hbox.set_margin_bottom(6);
        hbox.set_margin_start(6);
        hbox.set_margin_end(6);

        let text = gtk::Box::new(gtk::Orientation::Vertical, 2);
        text.set_hexpand(true);
        let title = gtk::Label::new(Some(&session.title));
        title.add_css_class("heading");
        title.set_halign(gtk::Align::Start);
        title.set_ellipsize(gtk::pango::EllipsizeMode::End);
        let preview = gtk::Label::new(Some(session.preview()));
        preview.add_css_class("dim-label");
        preview.add_css_class("caption");
        preview.set_halign(gtk::Align::Start);
        preview.set_ellipsize(gtk::pango::EllipsizeMode::End);
        let count = gtk::Label::new(Some(&format!("{} msgs", session.message_count)));
        count.add_css_class("caption");
        count.add_css_class("accent");
        count.set_halign(gtk::Align::Start);
        text.append(&title);
        text.append(&preview);
        text.append(&count);
        hbox.append(&text);

        let delete_btn = gtk::Button::from_icon_name("user-trash-symbolic");
        delete_btn.add_css_class("flat");
        delete_btn.set_valign(gtk::Align::Start);
        delete_btn.set_tooltip_text(Some("Delete session"));
        {
            let this = self.clone();
            let id = session.id.clone();
            delete_btn.connect_clicked(move |_| this.delete(id.clone()));
        }
        hbox.append(&delete_btn);

        row.set_child(Some(&hbox));
        row
    }
}
